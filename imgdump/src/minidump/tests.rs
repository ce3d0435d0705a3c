use super::*;

fn put(f: &mut [u8], offset: usize, bytes: &[u8]) {
    f[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn put32(f: &mut [u8], offset: usize, value: u32) {
    put(f, offset, &value.to_le_bytes());
}

fn put_string(f: &mut [u8], offset: usize, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    put32(f, offset, (units.len() * 2) as u32);
    for (i, u) in units.iter().enumerate() {
        put(f, offset + 4 + i * 2, &u.to_le_bytes());
    }
}

/// Header, a directory of three streams (system info, module list, and a stream type nobody
/// knows), plus the strings and CodeView record they point at.
fn sample() -> Vec<u8> {
    let mut f = vec![0u8; 0x160];

    #[rustfmt::skip]
    let header = [
        /* 0x0000 */ b'M', b'D', b'M', b'P', 0x93, 0xa7, 0, 0,
        /* 0x0008 */ 3, 0, 0, 0,                        // number of streams
        /* 0x000c */ 0x20, 0, 0, 0,                     // stream directory
        /* 0x0010 */ 0, 0, 0, 0, 0, 0x50, 0, 0,         // checksum, time stamp
        /* 0x0018 */ 0, 0, 0, 0, 0, 0, 0, 0,            // flags
        /* 0x0020 */ 7, 0, 0, 0, 56, 0, 0, 0, 0x50, 0, 0, 0,
        /* 0x002c */ 4, 0, 0, 0, 112, 0, 0, 0, 0x90, 0, 0, 0,
        /* 0x0038 */ 0x34, 0x12, 0, 0, 4, 0, 0, 0, 0, 1, 0, 0,
    ];
    put(&mut f, 0, &header);

    // system info
    #[rustfmt::skip]
    let sysinfo = [
        /* 0x0050 */ 9, 0, 6, 0, 0, 0, 4, 1,            // AMD64, level 6, 4 processors
        /* 0x0058 */ 10, 0, 0, 0, 0, 0, 0, 0,           // 10.0
        /* 0x0060 */ 0x61, 0x4a, 0, 0, 2, 0, 0, 0,      // build 19041, platform 2
        /* 0x0068 */ 0x10, 1, 0, 0,                     // CSD version
    ];
    put(&mut f, 0x50, &sysinfo);
    put_string(&mut f, 0x110, "SP");

    // module list
    put32(&mut f, 0x90, 1);
    put(&mut f, 0x94, &0x40_0000u64.to_le_bytes());
    put32(&mut f, 0x9c, 0x1000);
    put32(&mut f, 0xa8, 0x120);
    put32(&mut f, 0xac, 0xfeef04bd);
    put32(&mut f, 0xb4, 0x0001_0002);
    put32(&mut f, 0xb8, 0x0003_0004);
    put32(&mut f, 0xe0, 0x20);
    put32(&mut f, 0xe4, 0x140);
    put_string(&mut f, 0x120, "a.dll");

    // CodeView record
    put(&mut f, 0x140, b"RSDS");
    put(&mut f, 0x144, &[0x11; 16]);
    put32(&mut f, 0x154, 7);
    put(&mut f, 0x158, b"a.pdb\0");

    // the unknown stream
    put(&mut f, 0x100, b"\xde\xad\xbe\xef");
    f
}

#[test]
fn streams() {
    let view = ImageView::from_bytes(sample());
    let dump = decode(&view).unwrap();
    assert_eq!(dump.header.time_date_stamp.get(), 0x5000);

    let streams = dump.streams.as_ref().unwrap();
    assert_eq!(streams.len(), 3);

    match &streams[0].data {
        Ok(StreamData::SystemInfo { info, csd_version }) => {
            assert_eq!(processor_architecture_name(info.processor_architecture.get()), "AMD64");
            assert_eq!(info.number_of_processors, 4);
            assert_eq!(info.build_number.get(), 19041);
            assert_eq!(csd_version.as_deref(), Ok("SP"));
        }
        _ => panic!("expected system info"),
    }

    match &streams[1].data {
        Ok(StreamData::Modules(modules)) => {
            assert_eq!(modules.len(), 1);
            let m = &modules[0];
            assert_eq!(m.name.as_deref(), Ok("a.dll"));
            assert_eq!(m.raw.base_of_image.get(), 0x40_0000);
            assert_eq!(m.raw.version_info.file_version(), "1.2.3.4");
            match &m.codeview {
                Some(Ok(CodeView::Rsds(rsds))) => {
                    assert_eq!(rsds.age, 7);
                    assert_eq!(rsds.path, "a.pdb");
                }
                _ => panic!("expected an RSDS record"),
            }
        }
        _ => panic!("expected a module list"),
    }

    assert_eq!(streams[2].entry.tag, 0x1234);
    assert_eq!(stream_type_name(streams[2].entry.tag), None);
    assert!(matches!(streams[2].data, Ok(StreamData::Other(b)) if b.len() == 4));
}

#[test]
fn bad_stream_does_not_stop_the_others() {
    let mut f = sample();
    // Claim 1000 modules.
    put32(&mut f, 0x90, 1000);
    let view = ImageView::from_bytes(f);
    let dump = decode(&view).unwrap();
    let streams = dump.streams.as_ref().unwrap();
    assert!(streams[0].data.is_ok());
    assert!(matches!(streams[1].data, Err(LocalError::Overrun { .. })));
    assert!(streams[2].data.is_ok());
}

#[test]
fn stream_names_are_sorted() {
    assert!(STREAM_TYPE_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(stream_type_name(ThreadNamesStream), Some("ThreadNamesStream"));
}
