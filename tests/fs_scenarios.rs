//! The six literal end-to-end scenarios specified for this filesystem,
//! run against an in-memory device with the same constants the spec uses:
//! a 512-byte page, an 8191-page device, `MAX_FILE_NAME = 32`,
//! `first_page_loc = 20`, `first_byte_loc = 0`.

use storfs::{Config, OpenMode, StorFs};
use storfs::ram::RamDevice;

const PAGE_SIZE: u32 = 512;
const PAGE_COUNT: u64 = 8191;
const FIRST_PAGE_LOC: u64 = 20;

fn fresh_fs() -> StorFs<RamDevice> {
    let cfg = Config::new(PAGE_SIZE).with_first_page_loc(FIRST_PAGE_LOC);
    StorFs::new(RamDevice::new(PAGE_SIZE, PAGE_COUNT), cfg)
}

#[test]
fn scenario_1_mount_cold_then_reload() {
    let mut fs = fresh_fs();
    fs.mount("C:").unwrap();
    fs.mount("").unwrap();
    // next_open_byte should be (first_page_loc + 2) * page_size.
    // Exercised indirectly: a touch lands at page 22.
    fs.touch("C:/probe").unwrap();
    let stream = fs.open("C:/probe", OpenMode::Read).unwrap();
    assert!(stream.path_header().file_size > 0);
}

#[test]
fn scenario_2_create_write_read() {
    let mut fs = fresh_fs();
    fs.mount("C:").unwrap();
    fs.mkdir("C:/dir").unwrap();

    let mut stream = fs.open("C:/dir/f", OpenMode::WriteRead).unwrap();
    let mut payload = b"Hello How are You".to_vec();
    payload.push(0);
    assert_eq!(payload.len(), 18);
    fs.put(&mut stream, &payload).unwrap();

    fs.rewind(&mut stream).unwrap();
    let mut buf = vec![0u8; 100];
    let n = fs.get(&mut stream, &mut buf).unwrap();
    assert_eq!(n, 18);
    assert_eq!(&buf[0..17], b"Hello How are You");
    assert_eq!(buf[17], 0);
}

#[test]
fn scenario_3_multi_fragment_write() {
    let mut fs = fresh_fs();
    fs.mount("C:").unwrap();

    let payload: Vec<u8> = (0..1024u32).map(|i| b'!' + (i % 94) as u8).collect();
    let mut stream = fs.open("C:/big.bin", OpenMode::WriteRead).unwrap();
    fs.put(&mut stream, &payload).unwrap();

    fs.rewind(&mut stream).unwrap();
    let mut out = vec![0u8; 1024];
    let n = fs.get(&mut stream, &mut out).unwrap();
    assert_eq!(n, 1024);
    assert_eq!(out, payload);
}

#[test]
fn scenario_4_truncation_resets_file_size() {
    let mut fs = fresh_fs();
    fs.mount("C:").unwrap();

    let payload = vec![0x41u8; 1024];
    let mut stream = fs.open("C:/big.bin", OpenMode::WriteRead).unwrap();
    fs.put(&mut stream, &payload).unwrap();

    let reopened = fs.open("C:/big.bin", OpenMode::WriteRead).unwrap();
    let header_total = storfs::codec::header_total_size(32) as u32;
    assert_eq!(reopened.path_header().file_size, header_total);
}

#[test]
fn scenario_5_append_concatenates() {
    let mut fs = fresh_fs();
    fs.mount("C:").unwrap();

    let mut stream = fs.open("C:/log.txt", OpenMode::AppendRead).unwrap();
    let x = vec![b'x'; 17];
    let y = vec![b'y'; 1024];
    fs.put(&mut stream, &x).unwrap();
    fs.put(&mut stream, &y).unwrap();

    fs.rewind(&mut stream).unwrap();
    let mut out = vec![0u8; 1041];
    let n = fs.get(&mut stream, &mut out).unwrap();
    assert_eq!(n, 1041);
    assert_eq!(&out[0..17], x.as_slice());
    assert_eq!(&out[17..], y.as_slice());
}

#[test]
fn scenario_6_recursive_remove_frees_every_page() {
    let mut fs = fresh_fs();
    fs.mount("C:").unwrap();
    fs.mkdir("C:/Testing").unwrap();
    for i in 0..4 {
        fs.touch(&format!("C:/Testing/f{i}.txt")).unwrap();
    }
    fs.mkdir("C:/Testing/TEST").unwrap();
    for i in 0..4 {
        fs.touch(&format!("C:/Testing/TEST/g{i}.txt")).unwrap();
    }

    fs.rm("C:/Testing", None).unwrap();

    // The tree is gone: re-creating it from scratch must succeed, and a
    // fresh reload of the root must still mount cleanly.
    fs.mount("").unwrap();
    fs.mkdir("C:/Testing").unwrap();
}

#[test]
fn boundary_name_length_at_the_limit_is_accepted_one_over_is_rejected() {
    let mut fs = fresh_fs();
    fs.mount("C:").unwrap();

    // MAX_FILE_NAME = 32, so a 31-byte name (room for the null) succeeds.
    let ok_name = "a".repeat(31);
    fs.touch(&format!("C:/{ok_name}")).unwrap();

    // A 32-byte name leaves no room for the null terminator.
    let too_long = "a".repeat(32);
    assert!(fs.touch(&format!("C:/{too_long}")).is_err());
}

#[test]
fn boundary_path_rejects_a_dot_in_a_non_final_segment() {
    let mut fs = fresh_fs();
    fs.mount("C:").unwrap();
    assert!(fs.touch("C:/a.txt/b").is_err());
}

#[test]
fn boundary_mount_rejects_first_byte_loc_that_overflows_the_page() {
    let cfg = Config::new(PAGE_SIZE).with_first_byte_loc(PAGE_SIZE - 4);
    let mut fs = StorFs::new(RamDevice::new(PAGE_SIZE, 64), cfg);
    assert!(fs.mount("C:").is_err());
}

#[test]
fn boundary_exact_page_fit_versus_one_byte_over() {
    let mut fs = fresh_fs();
    fs.mount("C:").unwrap();

    let header_total = storfs::codec::header_total_size(32);
    let exact = vec![0x5Au8; PAGE_SIZE as usize - header_total];
    let mut s1 = fs.open("C:/exact.bin", OpenMode::WriteRead).unwrap();
    fs.put(&mut s1, &exact).unwrap();
    assert_eq!(s1.path_header().fragment_location, 0);

    let mut over = exact.clone();
    over.push(0x5B);
    let mut s2 = fs.open("C:/over.bin", OpenMode::WriteRead).unwrap();
    fs.put(&mut s2, &over).unwrap();
    assert_ne!(s2.path_header().fragment_location, 0);
}
