//! Integration tests for metadata ingestion

use urpm_metadata::{
    blob_md5, decompress, parse_hdlist, parse_synthesis, Codec, DiffPlan,
};
use urpm_types::{CapOp, Nevra};

fn synthesis_fixture() -> String {
    let mut out = String::new();
    for i in 0..50 {
        out.push_str(&format!("@provides@lib{i}.so.1@pkg{i}[== {i}.0-1]\n"));
        out.push_str(&format!("@requires@/bin/sh@libc.so.6\n"));
        out.push_str(&format!("@summary@Test package number {i}\n"));
        out.push_str(&format!("@info@pkg{i}-{i}.0-1.mga10.x86_64@0@{}@Testing\n", 1000 + i));
    }
    out
}

#[test]
fn synthesis_survives_every_codec() {
    let text = synthesis_fixture();

    let plain = text.as_bytes().to_vec();
    let zstd_blob = zstd::stream::encode_all(plain.as_slice(), 3).unwrap();
    let gz_blob = {
        use std::io::Write;
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        enc.write_all(&plain).unwrap();
        enc.finish().unwrap()
    };

    for blob in [&plain, &zstd_blob, &gz_blob] {
        let pkgs = parse_synthesis(blob).unwrap();
        assert_eq!(pkgs.len(), 50);
        assert_eq!(pkgs[7].nevra.name, "pkg7");
        assert_eq!(pkgs[7].provides[1].op, CapOp::Eq);
    }

    // The codec probe sees through the wrapper, never the extension
    assert_eq!(Codec::detect(&zstd_blob), Codec::Zstd);
    assert_eq!(Codec::detect(&gz_blob), Codec::Gzip);
    assert_eq!(decompress(&zstd_blob).unwrap(), plain);
}

#[test]
fn diff_plan_from_two_synthesis_generations() {
    let gen1 = "\
@info@a-1-1.noarch@0@1@G
@info@b-1-1.noarch@0@1@G
";
    let gen2 = "\
@info@a-1-1.noarch@0@1@G
@info@c-1-1.noarch@0@1@G
";
    let old: Vec<String> = urpm_metadata::synthesis::scan_nevras(gen1.as_bytes()).unwrap();
    let new: Vec<String> = urpm_metadata::synthesis::scan_nevras(gen2.as_bytes()).unwrap();

    let plan = DiffPlan::compute(old, new);
    assert_eq!(plan.to_delete, vec!["b-1-1.noarch".to_string()]);
    assert!(plan.to_insert.contains("c-1-1.noarch"));
    assert_eq!(plan.unchanged, 1);
}

#[test]
fn hdlist_and_synthesis_agree_on_identity() {
    let nevra = Nevra::new("zsh", 0, "5.9", "4.mga10", "x86_64");
    let mut pkg = urpm_types::PackageMeta::new(nevra.clone());
    pkg.summary = "A shell".into();
    pkg.group = "Shells".into();

    let header = urpm_metadata::hdlist::write_header(&urpm_metadata::HdlistEntry {
        package: pkg.clone(),
        files: Vec::new(),
    });
    let from_hdlist = parse_hdlist(&header).unwrap();

    let synth = urpm_metadata::write_synthesis(&[pkg]);
    let from_synth = parse_synthesis(synth.as_bytes()).unwrap();

    assert_eq!(from_hdlist[0].package.nevra, from_synth[0].nevra);
}

#[test]
fn blob_md5_tracks_content_changes() {
    let a = blob_md5(b"generation one");
    let b = blob_md5(b"generation two");
    assert_ne!(a, b);
    assert_eq!(a, blob_md5(b"generation one"));
}
