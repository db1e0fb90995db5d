use criterion::{Criterion, criterion_group, criterion_main};
use std::io;
use std::os::unix::fs::PermissionsExt;

use rimck_core::checker::SupervisorOptions;
use rimck_core::*;

criterion_group!(benches, admission_bench);
criterion_main!(benches);

const DISKS: u32 = 8;
const PER_DISK: u32 = 8;

struct BenchTopology;

fn parse_dev(device: &str) -> Option<(u32, u32)> {
    let rest = device.strip_prefix("/dev/d")?;
    let (disk, part) = rest.split_once('p')?;
    Some((disk.parse().ok()?, part.parse().ok()?))
}

impl DiskTopology for BenchTopology {
    fn whole_disk(&self, device: &str) -> io::Result<DiskId> {
        let (disk, _) = parse_dev(device).ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        Ok(DiskId::new(8, disk * 16))
    }
    fn count_slaves(&self, disk: DiskId) -> io::Result<usize> {
        Ok(if disk.minor == 0 { 2 } else { 0 })
    }
    fn is_rotational(&self, _disk: DiskId) -> io::Result<bool> {
        Ok(true)
    }
    fn disk_name(&self, disk: DiskId) -> io::Result<String> {
        Ok(format!("d{}", disk.minor / 16))
    }
    fn is_block_device(&self, device: &str) -> bool {
        parse_dev(device).is_some()
    }
}

fn rows() -> Vec<TableEntry> {
    let mut rows = Vec::new();
    for part in 0..PER_DISK {
        for disk in 0..DISKS {
            rows.push(
                TableEntry::new(format!("/dev/d{disk}p{part}"))
                    .with_target(format!("/mnt/{disk}/{part}"))
                    .with_fstype("ext4")
                    .with_passno(1 + part % 3),
            );
        }
    }
    rows
}

pub fn admission_bench(c: &mut Criterion) {
    let bin = tempfile::tempdir().expect("tempdir failed");
    let checker = bin.path().join("fsck.ext4");
    std::fs::write(&checker, "#!/bin/sh\nexit 0\n").expect("write failed");
    std::fs::set_permissions(&checker, std::fs::Permissions::from_mode(0o755))
        .expect("chmod failed");

    let opts = SupervisorOptions {
        noexecute: true,
        ..Default::default()
    };

    c.bench_function("check_all_dry_run_64", |b| {
        b.iter(|| {
            let supervisor = CheckerSupervisor::new(
                opts.clone(),
                CheckerLocator::new(bin.path()),
                CancelToken::new(),
            );
            let catalog = FilesystemCatalog::new(rows());
            let mut sched =
                Scheduler::new(SchedulerOptions::default(), catalog, supervisor, BenchTopology);
            sched.check_all()
        });
    });

    c.bench_function("check_all_dry_run_64_capped", |b| {
        b.iter(|| {
            let supervisor = CheckerSupervisor::new(
                opts.clone(),
                CheckerLocator::new(bin.path()),
                CancelToken::new(),
            );
            let catalog = FilesystemCatalog::new(rows());
            let sched_opts = SchedulerOptions {
                max_running: Some(3),
                ..Default::default()
            };
            let mut sched = Scheduler::new(sched_opts, catalog, supervisor, BenchTopology);
            sched.check_all()
        });
    });
}
