//! A small example consumer: mounts a `RamDevice`, builds a couple of
//! directories and files, writes and reads back a multi-fragment payload,
//! and removes a subtree — the same lifecycle `tests/fs_scenarios.rs`
//! exercises, run here as a standalone program so it can be read top to
//! bottom without the test harness around it. Not part of the crate's
//! public contract; a real embedded consumer supplies its own
//! `BlockDevice` backed by actual flash.

use storfs::ram::RamDevice;
use storfs::{Config, OpenMode, StorFs};

fn main() {
    env_logger::init();

    let cfg = Config::new(512).with_first_page_loc(20);
    let mut fs = StorFs::new(RamDevice::new(512, 1024), cfg);

    fs.mount("C:").expect("format or reload the partition");
    fs.mkdir("C:/notes").expect("create a directory");

    let mut stream = fs
        .open("C:/notes/todo.txt", OpenMode::WriteRead)
        .expect("create and open a file for writing");
    fs.put(&mut stream, b"buy flash chips\nwrite more tests\n")
        .expect("write the file's contents");

    fs.rewind(&mut stream).expect("reset the read cursor");
    let mut out = vec![0u8; 64];
    let n = fs.get(&mut stream, &mut out).expect("read the file back");
    println!("read {n} bytes: {:?}", String::from_utf8_lossy(&out[..n]));

    fs.rm("C:/notes", None).expect("recursively remove the directory");
    println!("removed C:/notes");
}
