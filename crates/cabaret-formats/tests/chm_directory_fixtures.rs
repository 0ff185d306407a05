#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Integration tests for the help-file chunked directory index.
//!
//! Fixture help files are built byte by byte: file and directory headers,
//! PMGL/PMGI chunks with quick-reference tables, ENCINT-encoded entries,
//! and a section-0 content area.

use std::io::Cursor;

use cabaret_formats::chm::{ChmError, HelpFile, SECTION_COMPRESSED, SECTION_UNCOMPRESSED};
use cabaret_formats::Options;

// ---------------------------------------------------------------------- //
// Fixture builder

const CHUNK_SIZE: usize = 512;
const NO_CHUNK: u32 = 0xFFFF_FFFF;

fn encint(value: u64, out: &mut Vec<u8>) {
    let mut groups = [0u8; 10];
    let mut count = 0;
    let mut rest = value;
    loop {
        groups[count] = (rest & 0x7F) as u8;
        count += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (1..count).rev() {
        out.push(groups[i] | 0x80);
    }
    out.push(groups[0]);
}

struct Entry {
    name: Vec<u8>,
    section: u32,
    offset: u64,
    length: u64,
}

impl Entry {
    fn new(name: &str, section: u32, offset: u64, length: u64) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            section,
            offset,
            length,
        }
    }
}

fn quickrefs(chunk: &mut [u8], entry_offsets: &[usize], density: u32) {
    let per_group = 1 + (1usize << density);
    let count = entry_offsets.len();
    let refs = count.saturating_sub(1) / per_group;
    for group in 1..=refs {
        let at = chunk.len() - 2 - 2 * group;
        let offset = entry_offsets[group * per_group] as u16;
        chunk[at..at + 2].copy_from_slice(&offset.to_le_bytes());
    }
    let len = chunk.len();
    chunk[len - 2..].copy_from_slice(&(count as u16).to_le_bytes());
}

fn build_leaf(entries: &[Entry], density: u32, prev: u32, next: u32) -> Vec<u8> {
    let mut body = Vec::new();
    let mut entry_offsets = Vec::new();
    for entry in entries {
        entry_offsets.push(body.len());
        encint(entry.name.len() as u64, &mut body);
        body.extend_from_slice(&entry.name);
        encint(u64::from(entry.section), &mut body);
        encint(entry.offset, &mut body);
        encint(entry.length, &mut body);
    }
    let quickref_len = CHUNK_SIZE - 0x14 - body.len();
    let mut chunk = Vec::with_capacity(CHUNK_SIZE);
    chunk.extend_from_slice(b"PMGL");
    chunk.extend_from_slice(&(quickref_len as u32).to_le_bytes());
    chunk.extend_from_slice(&0u32.to_le_bytes());
    chunk.extend_from_slice(&prev.to_le_bytes());
    chunk.extend_from_slice(&next.to_le_bytes());
    chunk.extend_from_slice(&body);
    chunk.resize(CHUNK_SIZE, 0);
    quickrefs(&mut chunk, &entry_offsets, density);
    chunk
}

fn build_index(routes: &[(Vec<u8>, u32)], density: u32) -> Vec<u8> {
    let mut body = Vec::new();
    let mut entry_offsets = Vec::new();
    for (name, child) in routes {
        entry_offsets.push(body.len());
        encint(name.len() as u64, &mut body);
        body.extend_from_slice(name);
        encint(u64::from(*child), &mut body);
    }
    let quickref_len = CHUNK_SIZE - 0x08 - body.len();
    let mut chunk = Vec::with_capacity(CHUNK_SIZE);
    chunk.extend_from_slice(b"PMGI");
    chunk.extend_from_slice(&(quickref_len as u32).to_le_bytes());
    chunk.extend_from_slice(&body);
    chunk.resize(CHUNK_SIZE, 0);
    quickrefs(&mut chunk, &entry_offsets, density);
    chunk
}

struct DirSpec {
    density: u32,
    depth: u32,
    root_chunk: u32,
    first_leaf: u32,
    last_leaf: u32,
}

fn build_chm(spec: &DirSpec, chunks: &[Vec<u8>], content: &[u8]) -> Vec<u8> {
    let dir_offset = 0x60u64;
    let chunks_offset = dir_offset + 0x54;
    let chunks_len = (CHUNK_SIZE * chunks.len()) as u64;
    let content_offset = chunks_offset + chunks_len;
    let dir_length = 0x54 + chunks_len;

    let mut image = Vec::new();
    image.extend_from_slice(b"ITSF");
    image.extend_from_slice(&3u32.to_le_bytes()); // version
    image.extend_from_slice(&0x60u32.to_le_bytes()); // header length
    image.extend_from_slice(&1u32.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes()); // timestamp
    image.extend_from_slice(&0x0409u32.to_le_bytes()); // language
    image.extend_from_slice(&[0u8; 16]); // guid1
    image.extend_from_slice(&[0u8; 16]); // guid2
    image.extend_from_slice(&dir_offset.to_le_bytes()); // sec0 offset (opaque)
    image.extend_from_slice(&0x18u64.to_le_bytes()); // sec0 length (opaque)
    image.extend_from_slice(&dir_offset.to_le_bytes());
    image.extend_from_slice(&dir_length.to_le_bytes());
    image.extend_from_slice(&content_offset.to_le_bytes());
    assert_eq!(image.len(), 0x60);

    image.extend_from_slice(b"ITSP");
    image.extend_from_slice(&1u32.to_le_bytes()); // version
    image.extend_from_slice(&0x54u32.to_le_bytes()); // header length
    image.extend_from_slice(&0x0Au32.to_le_bytes());
    image.extend_from_slice(&(CHUNK_SIZE as u32).to_le_bytes());
    image.extend_from_slice(&spec.density.to_le_bytes());
    image.extend_from_slice(&spec.depth.to_le_bytes());
    image.extend_from_slice(&spec.root_chunk.to_le_bytes());
    image.extend_from_slice(&spec.first_leaf.to_le_bytes());
    image.extend_from_slice(&spec.last_leaf.to_le_bytes());
    image.extend_from_slice(&NO_CHUNK.to_le_bytes());
    image.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
    image.extend_from_slice(&0x0409u32.to_le_bytes());
    image.extend_from_slice(&[0u8; 16]); // guid
    image.extend_from_slice(&0x54u32.to_le_bytes());
    image.extend_from_slice(&NO_CHUNK.to_le_bytes());
    image.extend_from_slice(&NO_CHUNK.to_le_bytes());
    image.extend_from_slice(&NO_CHUNK.to_le_bytes());
    assert_eq!(image.len() as u64, chunks_offset);

    for chunk in chunks {
        assert_eq!(chunk.len(), CHUNK_SIZE);
        image.extend_from_slice(chunk);
    }
    assert_eq!(image.len() as u64, content_offset);
    image.extend_from_slice(content);
    image
}

/// A simple three-entry help file with section-0 content.
fn simple_fixture() -> (Vec<u8>, Vec<(&'static str, Vec<u8>)>) {
    let contents = vec![
        ("/alpha.html", b"<html>alpha page</html>".to_vec()),
        ("/beta.css", b"body { margin: 0 }".to_vec()),
        ("/gamma.js", b"export const gamma = 3;".to_vec()),
    ];
    let mut blob = Vec::new();
    let mut entries = Vec::new();
    for (name, data) in &contents {
        entries.push(Entry::new(
            name,
            SECTION_UNCOMPRESSED,
            blob.len() as u64,
            data.len() as u64,
        ));
        blob.extend_from_slice(data);
    }
    let leaf = build_leaf(&entries, 2, NO_CHUNK, NO_CHUNK);
    let spec = DirSpec {
        density: 2,
        depth: 1,
        root_chunk: NO_CHUNK,
        first_leaf: 0,
        last_leaf: 0,
    };
    (build_chm(&spec, &[leaf], &blob), contents)
}

// ---------------------------------------------------------------------- //
// Listing and extraction

#[test]
fn open_lists_entries_and_extracts_section_zero() {
    let (image, contents) = simple_fixture();
    let mut help = HelpFile::open(Cursor::new(image), Options::default()).expect("open");

    assert_eq!(help.entries().len(), 3);
    assert_eq!(help.file_header().version, 3);
    assert_eq!(help.directory_header().chunk_count, 1);

    for (name, data) in &contents {
        let entry = help.find(name).expect("entry listed").clone();
        assert_eq!(entry.section, SECTION_UNCOMPRESSED);
        let mut out = Vec::new();
        help.extract(&entry, &mut out).expect("extract");
        assert_eq!(&out, data);
    }
    assert!(help.warnings().is_empty());
}

#[test]
fn fast_find_agrees_with_the_full_walk() {
    let (image, contents) = simple_fixture();
    let listing = HelpFile::open(Cursor::new(image.clone()), Options::default())
        .expect("full open");

    // Headers only: no listing, lookups go through the on-disk index.
    let mut fast =
        HelpFile::fast_open(Cursor::new(image), Options::default()).expect("fast open");
    assert!(fast.entries().is_empty());

    for (name, _) in &contents {
        let walked = listing.find(name).expect("listed entry");
        let found = fast
            .fast_find(name)
            .expect("fast_find succeeds")
            .expect("entry found");
        assert_eq!(found.offset, walked.offset);
        assert_eq!(found.length, walked.length);
        assert_eq!(found.section, walked.section);
    }

    // Case folding is part of the name order.
    assert!(
        fast.fast_find("/ALPHA.HTML")
            .expect("lookup succeeds")
            .is_some()
    );
    assert!(
        fast.fast_find("/missing.html")
            .expect("lookup succeeds")
            .is_none()
    );
}

#[test]
fn fast_find_routes_through_an_index_chunk() {
    // Twelve entries over two leaves, one PMGI root. Density 1 gives a
    // quick-reference group of three entries, so the in-chunk binary
    // search actually consults the table.
    let names: Vec<String> = (0..12).map(|i| format!("/file{i:02}.txt")).collect();
    let mut blob = Vec::new();
    let mut all = Vec::new();
    for (index, name) in names.iter().enumerate() {
        let data = format!("contents of file {index}");
        all.push(Entry::new(
            name,
            SECTION_UNCOMPRESSED,
            blob.len() as u64,
            data.len() as u64,
        ));
        blob.extend_from_slice(data.as_bytes());
    }
    let (first_half, second_half) = all.split_at(6);
    let leaf0 = build_leaf(first_half, 1, NO_CHUNK, 1);
    let leaf1 = build_leaf(second_half, 1, 0, NO_CHUNK);
    let root = build_index(
        &[
            (names[0].as_bytes().to_vec(), 0),
            (names[6].as_bytes().to_vec(), 1),
        ],
        1,
    );
    let spec = DirSpec {
        density: 1,
        depth: 2,
        root_chunk: 2,
        first_leaf: 0,
        last_leaf: 1,
    };
    let image = build_chm(&spec, &[leaf0, leaf1, root], &blob);

    let listing =
        HelpFile::open(Cursor::new(image.clone()), Options::default()).expect("full open");
    assert_eq!(listing.entries().len(), 12);

    let mut fast =
        HelpFile::fast_open(Cursor::new(image), Options::default()).expect("fast open");
    for name in &names {
        let walked = listing.find(name).expect("listed");
        let found = fast
            .fast_find(name)
            .expect("fast_find succeeds")
            .expect("found via index");
        assert_eq!(found.offset, walked.offset);
        assert_eq!(found.length, walked.length);
    }
    assert!(
        fast.fast_find("/file99.txt")
            .expect("lookup succeeds")
            .is_none()
    );
    assert!(fast.fast_find("/aaa").expect("lookup succeeds").is_none());
}

// ---------------------------------------------------------------------- //
// Malformed directories

#[test]
fn corrupt_signatures_fail_with_bad_signature() {
    let (image, _) = simple_fixture();

    let mut bad_itsf = image.clone();
    bad_itsf[0] = b'X';
    assert!(matches!(
        HelpFile::open(Cursor::new(bad_itsf), Options::default()),
        Err(ChmError::BadSignature(_))
    ));

    let mut bad_itsp = image.clone();
    bad_itsp[0x60] = b'X';
    assert!(matches!(
        HelpFile::open(Cursor::new(bad_itsp), Options::default()),
        Err(ChmError::BadSignature(_))
    ));

    let mut bad_leaf = image;
    bad_leaf[0x60 + 0x54] = b'X';
    assert!(matches!(
        HelpFile::open(Cursor::new(bad_leaf), Options::default()),
        Err(ChmError::BadSignature(_))
    ));
}

#[test]
fn encint_overrunning_the_chunk_is_a_format_error() {
    // One declared entry whose name-length ENCINT never terminates: every
    // usable byte has the continuation bit set, so decoding must stop at
    // the chunk boundary with a format error.
    let body_len = 4;
    let quickref_len = CHUNK_SIZE - 0x14 - body_len;
    let mut chunk = Vec::with_capacity(CHUNK_SIZE);
    chunk.extend_from_slice(b"PMGL");
    chunk.extend_from_slice(&(quickref_len as u32).to_le_bytes());
    chunk.extend_from_slice(&0u32.to_le_bytes());
    chunk.extend_from_slice(&NO_CHUNK.to_le_bytes());
    chunk.extend_from_slice(&NO_CHUNK.to_le_bytes());
    chunk.extend_from_slice(&[0xFF; 4]);
    chunk.resize(CHUNK_SIZE, 0);
    let len = chunk.len();
    chunk[len - 2..].copy_from_slice(&1u16.to_le_bytes());

    let spec = DirSpec {
        density: 2,
        depth: 1,
        root_chunk: NO_CHUNK,
        first_leaf: 0,
        last_leaf: 0,
    };
    let image = build_chm(&spec, &[chunk], b"");

    assert!(matches!(
        HelpFile::open(Cursor::new(image.clone()), Options::default()),
        Err(ChmError::DataFormat(_))
    ));
    let mut fast = HelpFile::fast_open(Cursor::new(image), Options::default()).expect("headers");
    assert!(matches!(
        fast.fast_find("/anything"),
        Err(ChmError::DataFormat(_))
    ));
}

#[test]
fn salvage_mode_drops_an_undecodable_leaf() {
    let good = vec![
        Entry::new("/one.txt", SECTION_UNCOMPRESSED, 0, 3),
        Entry::new("/two.txt", SECTION_UNCOMPRESSED, 3, 3),
    ];
    // Valid framing, but the entry name is not UTF-8.
    let bad = vec![Entry {
        name: vec![0xFF, 0xFE],
        section: SECTION_UNCOMPRESSED,
        offset: 6,
        length: 2,
    }];
    let leaf0 = build_leaf(&good, 2, NO_CHUNK, 1);
    let leaf1 = build_leaf(&bad, 2, 0, NO_CHUNK);
    let spec = DirSpec {
        density: 2,
        depth: 1,
        root_chunk: NO_CHUNK,
        first_leaf: 0,
        last_leaf: 1,
    };
    let image = build_chm(&spec, &[leaf0, leaf1], b"abcdefgh");

    assert!(matches!(
        HelpFile::open(Cursor::new(image.clone()), Options::default()),
        Err(ChmError::DataFormat(_))
    ));

    let help = HelpFile::open(Cursor::new(image), Options::lenient()).expect("salvage open");
    assert_eq!(help.entries().len(), 2);
    assert_eq!(help.warnings().len(), 1);
}

// ---------------------------------------------------------------------- //
// Compressed section plumbing

#[test]
fn compressed_section_resolves_and_reports_the_missing_codec() {
    let compressed_bytes = vec![0xA5u8; 64];

    let mut control = Vec::new();
    control.extend_from_slice(&6u32.to_le_bytes());
    control.extend_from_slice(b"LZXC");
    control.extend_from_slice(&2u32.to_le_bytes()); // version 2: frame units
    control.extend_from_slice(&1u32.to_le_bytes()); // reset interval: 1 frame
    control.extend_from_slice(&1u32.to_le_bytes()); // window: 1 frame = 32 KiB
    control.extend_from_slice(&0u32.to_le_bytes()); // cache size

    let mut reset_table = Vec::new();
    reset_table.extend_from_slice(&2u32.to_le_bytes());
    reset_table.extend_from_slice(&1u32.to_le_bytes()); // one frame entry
    reset_table.extend_from_slice(&8u32.to_le_bytes());
    reset_table.extend_from_slice(&0x28u32.to_le_bytes());
    reset_table.extend_from_slice(&100u64.to_le_bytes()); // uncompressed
    reset_table.extend_from_slice(&64u64.to_le_bytes()); // compressed
    reset_table.extend_from_slice(&0x8000u64.to_le_bytes());
    reset_table.extend_from_slice(&0u64.to_le_bytes()); // frame 0 offset

    let mut blob = Vec::new();
    let content_at = blob.len() as u64;
    blob.extend_from_slice(&compressed_bytes);
    let control_at = blob.len() as u64;
    blob.extend_from_slice(&control);
    let table_at = blob.len() as u64;
    blob.extend_from_slice(&reset_table);

    // Sorted case-insensitively: '/' before ':'.
    let entries = vec![
        Entry::new("/compressed.bin", SECTION_COMPRESSED, 0, 100),
        Entry::new(
            "::DataSpace/Storage/MSCompressed/Content",
            SECTION_UNCOMPRESSED,
            content_at,
            64,
        ),
        Entry::new(
            "::DataSpace/Storage/MSCompressed/ControlData",
            SECTION_UNCOMPRESSED,
            control_at,
            24,
        ),
        Entry::new(
            "::DataSpace/Storage/MSCompressed/Transform/\
             {7FC28940-9D31-11D0-9B27-00A0C91E9C7C}/InstanceData/ResetTable",
            SECTION_UNCOMPRESSED,
            table_at,
            48,
        ),
    ];
    let leaf = build_leaf(&entries, 2, NO_CHUNK, NO_CHUNK);
    let spec = DirSpec {
        density: 2,
        depth: 1,
        root_chunk: NO_CHUNK,
        first_leaf: 0,
        last_leaf: 0,
    };
    let image = build_chm(&spec, &[leaf], &blob);

    let mut help = HelpFile::open(Cursor::new(image), Options::default()).expect("open");
    let entry = help.find("/compressed.bin").expect("listed").clone();
    let mut out = Vec::new();
    let result = help.extract(&entry, &mut out);
    // The section resolves (control data and reset table parse); only the
    // bit-level LZX decoder is absent.
    assert!(matches!(
        result,
        Err(ChmError::Codec(cabaret_codecs::CodecError::Unsupported("LZX")))
    ));
}
