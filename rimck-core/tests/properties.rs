// SPDX-License-Identifier: MIT

mod common;

use std::collections::BTreeSet;

use common::*;
use rimck_core::sched::Stage;
use rimck_core::*;

fn topology() -> FakeTopology {
    FakeTopology::new()
        .device("/dev/sda1", 8, 0)
        .device("/dev/sda2", 8, 0)
        .device("/dev/sda3", 8, 0)
        .device("/dev/sdb1", 8, 16)
        .device("/dev/sdb2", 8, 16)
        .device("/dev/sdc1", 8, 32)
        .device("/dev/md0", 9, 0)
        .device("/dev/md1", 9, 1)
        .stacked(9, 0)
        .stacked(9, 1)
}

/// A mixed table: several passes, shared disks, stacked disks, a pass 0
/// entry and a device the topology does not know.
fn mixed() -> Vec<TableEntry> {
    vec![
        entry("/dev/sda1", "/", "ext4", 1),
        entry("/dev/sda2", "/home", "ext4", 2),
        entry("/dev/sdb1", "/srv", "xfs", 2),
        entry("/dev/md0", "/raid", "ext4", 2),
        entry("/dev/sda3", "/var", "xfs", 3),
        entry("/dev/sdb2", "/opt", "ext4", 2),
        entry("/dev/sdc1", "/scratch", "ext4", 0),
        entry("LABEL=backup", "/backup", "ext4", 3),
        entry("/dev/md1", "/raid2", "xfs", 3),
        entry("/dev/sdc1", "/tmp2", "ext2", 4),
    ]
}

fn status_of(dev: &str) -> ExitStatus {
    match dev {
        "/dev/sdb1" => ExitStatus::NONDESTRUCT,
        "/dev/md0" => ExitStatus::UNCORRECTED,
        "/dev/sdc1" => ExitStatus::DESTRUCT,
        _ => ExitStatus::OK,
    }
}

fn option_grid() -> Vec<SchedulerOptions> {
    let mut grid = Vec::new();
    for serialize in [false, true] {
        for parallel_root in [false, true] {
            for max_running in [None, Some(2)] {
                grid.push(SchedulerOptions {
                    serialize,
                    parallel_root,
                    max_running,
                    ..Default::default()
                });
            }
        }
    }
    grid
}

#[test]
fn test_at_most_one_checker_per_disk() {
    for opts in option_grid() {
        let mut run = DryRun::new(mixed(), topology(), opts);
        run.scheduler.check_all();
        run.assert_one_per_disk();
    }
}

#[test]
fn test_no_entry_runs_before_its_pass() {
    for opts in option_grid() {
        let mut run = DryRun::new(mixed(), topology(), opts.clone());
        run.scheduler.check_all();

        let catalog = run.scheduler.catalog();
        let mut last = 0;
        for d in run.dispatches() {
            match d.stage {
                Stage::Pass(p) => {
                    assert!(catalog.entry(d.entry).passno <= p, "{opts:?}");
                    assert!(p >= last, "passes went backwards: {opts:?}");
                    last = p;
                }
                Stage::Root => assert!(catalog.entry(d.entry).is_root()),
                Stage::Explicit => panic!("explicit dispatch during check_all"),
            }
        }
    }
}

#[test]
fn test_run_drains_everything_it_dispatched() {
    for opts in option_grid() {
        let mut run = DryRun::new(mixed(), topology(), opts);
        run.scheduler.check_all();

        assert_eq!(run.scheduler.supervisor().running_count(), 0);
        let dispatched: BTreeSet<_> = run.order().into_iter().collect();
        let reaped: BTreeSet<_> = run.reaped.borrow().iter().cloned().collect();
        assert_eq!(dispatched, reaped);
        assert_eq!(run.order().len(), run.reaped.borrow().len());

        // every entry except the pass 0 one was dispatched
        assert_eq!(run.dispatches().len(), 9);
        assert!((0..run.scheduler.catalog().len()).all(|i| run.scheduler.catalog().is_done(i)));
    }
}

#[test]
fn test_status_is_or_of_all_checkers() {
    let opts = SchedulerOptions {
        parallel_root: true,
        ..Default::default()
    };
    let mut run = DryRun::with_status(mixed(), topology(), opts, status_of);

    let status = run.scheduler.check_all();

    let expected = run
        .reaped
        .borrow()
        .iter()
        .fold(ExitStatus::OK, |acc, dev| acc | status_of(dev));
    assert_eq!(status, expected);
    assert_eq!(
        status,
        ExitStatus::NONDESTRUCT | ExitStatus::UNCORRECTED | ExitStatus::DESTRUCT
    );
}

#[test]
fn test_cancel_broadcast_is_sent_once() {
    let opts = SchedulerOptions {
        parallel_root: true,
        ..Default::default()
    };
    let token = CancelToken::new();
    let trigger = token.clone();
    let mut run = DryRun::with_token(mixed(), topology(), opts, token, move |dev| {
        // from the first pass 2 reap on, every reap looks like another signal
        if dev != "/dev/sda1" {
            trigger.cancel();
        }
        ExitStatus::OK
    });

    run.scheduler.check_all();

    let sup = run.scheduler.supervisor();
    assert_eq!(sup.cancel_broadcasts(), 1);
    assert!(sup.kill_sent());
    assert_eq!(sup.running_count(), 0);
    assert_eq!(run.order(), ["/dev/sda1", "/dev/sda2", "/dev/sdb1"]);
    assert_eq!(run.reaped.borrow().len(), 3);
}

#[test]
fn test_cancel_stops_explicit_device_list() {
    let mut run = DryRun::new(mixed(), topology(), SchedulerOptions::default());
    run.cancel.cancel();

    let status = run.scheduler.check_devices(&["/home", "/srv"]);

    assert_eq!(status, ExitStatus::OK);
    assert!(run.dispatches().is_empty());
    assert_eq!(run.scheduler.supervisor().cancel_broadcasts(), 1);
}
