//! hdlist parser: concatenated binary RPM headers
//!
//! Each header is framed as
//!
//! ```text
//! 3 bytes magic 8E AD E8 | 1 byte version
//! 4 bytes reserved (zero)
//! 4 bytes big-endian nindex
//! 4 bytes big-endian hsize
//! nindex x 16-byte index entries (tag, type, offset, count)
//! hsize bytes of data store
//! ```
//!
//! The parser advances header by header and, on magic mismatch, scans
//! forward until it resynchronizes on the next magic or hits EOF.

use urpm_errors::{Error, MetadataError};
use urpm_types::{CapOp, Capability, Evr, Nevra, PackageFile, PackageMeta};

use crate::compression::decompress;

const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

// Tags we extract, by fixed numeric id
const TAG_NAME: u32 = 1000;
const TAG_VERSION: u32 = 1001;
const TAG_RELEASE: u32 = 1002;
const TAG_EPOCH: u32 = 1003;
const TAG_SUMMARY: u32 = 1004;
const TAG_DESCRIPTION: u32 = 1005;
const TAG_SIZE: u32 = 1009;
const TAG_LICENSE: u32 = 1014;
const TAG_GROUP: u32 = 1016;
const TAG_URL: u32 = 1020;
const TAG_ARCH: u32 = 1022;
const TAG_PROVIDENAME: u32 = 1047;
const TAG_PROVIDEFLAGS: u32 = 1112;
const TAG_PROVIDEVERSION: u32 = 1113;
const TAG_REQUIRENAME: u32 = 1049;
const TAG_REQUIREFLAGS: u32 = 1048;
const TAG_REQUIREVERSION: u32 = 1050;
const TAG_CONFLICTNAME: u32 = 1054;
const TAG_CONFLICTFLAGS: u32 = 1053;
const TAG_CONFLICTVERSION: u32 = 1055;
const TAG_OBSOLETENAME: u32 = 1090;
const TAG_OBSOLETEFLAGS: u32 = 1114;
const TAG_OBSOLETEVERSION: u32 = 1115;
const TAG_RECOMMENDNAME: u32 = 5046;
const TAG_RECOMMENDFLAGS: u32 = 5048;
const TAG_RECOMMENDVERSION: u32 = 5047;
const TAG_SUGGESTNAME: u32 = 5049;
const TAG_SUGGESTFLAGS: u32 = 5051;
const TAG_SUGGESTVERSION: u32 = 5050;
const TAG_BASENAMES: u32 = 1117;
const TAG_DIRNAMES: u32 = 1118;
const TAG_DIRINDEXES: u32 = 1119;

const TYPE_INT32: u32 = 4;
const TYPE_STRING: u32 = 6;
const TYPE_STRING_ARRAY: u32 = 8;
const TYPE_I18NSTRING: u32 = 9;

// A header larger than this is corrupt framing, not data
const MAX_NINDEX: u32 = 65_536;
const MAX_HSIZE: u32 = 256 * 1024 * 1024;

/// One parsed header: the package record plus its file list
#[derive(Debug, Clone)]
pub struct HdlistEntry {
    pub package: PackageMeta,
    pub files: Vec<PackageFile>,
}

/// Parse a (possibly compressed) hdlist blob.
///
/// # Errors
///
/// Returns an error on decompression failure or a header whose framing
/// is plausible but truncated. Garbage between headers is skipped.
pub fn parse_hdlist(data: &[u8]) -> Result<Vec<HdlistEntry>, Error> {
    let raw = decompress(data)?;
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while let Some(start) = find_magic(&raw, offset) {
        match parse_header(&raw, start) {
            Ok((entry, next)) => {
                entries.push(entry);
                offset = next;
            }
            Err(HeaderError::BadFraming) => {
                // Resynchronize after the bad magic
                offset = start + 1;
            }
            Err(HeaderError::Truncated) => {
                return Err(MetadataError::TruncatedHeader {
                    offset: start as u64,
                }
                .into());
            }
        }
    }

    Ok(entries)
}

/// NEVRA set of an hdlist blob (full parse; hdlist has no cheap scan).
///
/// # Errors
///
/// Same failure modes as [`parse_hdlist`].
pub fn scan_nevras(data: &[u8]) -> Result<Vec<String>, Error> {
    Ok(parse_hdlist(data)?
        .into_iter()
        .map(|e| e.package.nevra.to_string())
        .collect())
}

fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(3)
        .position(|w| w == HEADER_MAGIC)
        .map(|p| from + p)
}

enum HeaderError {
    /// Magic was a false positive; skip one byte and rescan
    BadFraming,
    /// Real header cut short by EOF
    Truncated,
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

#[allow(clippy::too_many_lines)]
fn parse_header(data: &[u8], start: usize) -> Result<(HdlistEntry, usize), HeaderError> {
    // magic(3) + version(1) + reserved(4) + nindex(4) + hsize(4)
    if start + 16 > data.len() {
        return Err(HeaderError::Truncated);
    }
    let nindex = be_u32(data, start + 8).ok_or(HeaderError::Truncated)?;
    let hsize = be_u32(data, start + 12).ok_or(HeaderError::Truncated)?;
    if nindex == 0 || nindex > MAX_NINDEX || hsize > MAX_HSIZE {
        return Err(HeaderError::BadFraming);
    }

    let index_start = start + 16;
    let store_start = index_start + nindex as usize * 16;
    let store_end = store_start + hsize as usize;
    if store_end > data.len() {
        return Err(HeaderError::Truncated);
    }

    let store = &data[store_start..store_end];
    let header = Header {
        index: (0..nindex as usize)
            .filter_map(|i| {
                let at = index_start + i * 16;
                Some(IndexEntry {
                    tag: be_u32(data, at)?,
                    typ: be_u32(data, at + 4)?,
                    offset: be_u32(data, at + 8)? as usize,
                    count: be_u32(data, at + 12)? as usize,
                })
            })
            .collect(),
        store,
    };

    let name = header.get_string(TAG_NAME).unwrap_or_default();
    if name.is_empty() {
        return Err(HeaderError::BadFraming);
    }
    let version = header.get_string(TAG_VERSION).unwrap_or_default();
    let release = header.get_string(TAG_RELEASE).unwrap_or_default();
    let arch = header
        .get_string(TAG_ARCH)
        .unwrap_or_else(|| "noarch".to_string());
    let epoch = header
        .get_u32_array(TAG_EPOCH)
        .and_then(|v| v.first().copied())
        .unwrap_or(0);

    let nevra = Nevra::new(name, epoch, version, release, arch);
    let mut pkg = PackageMeta::new(nevra.clone());
    pkg.summary = header.get_string(TAG_SUMMARY).unwrap_or_default();
    pkg.group = header.get_string(TAG_GROUP).unwrap_or_default();
    pkg.size = u64::from(
        header
            .get_u32_array(TAG_SIZE)
            .and_then(|v| v.first().copied())
            .unwrap_or(0),
    );
    pkg.description = header.get_string(TAG_DESCRIPTION);
    pkg.license = header.get_string(TAG_LICENSE);
    pkg.url = header.get_string(TAG_URL);

    pkg.provides = header.dep_triples(TAG_PROVIDENAME, TAG_PROVIDEFLAGS, TAG_PROVIDEVERSION);
    pkg.requires = header.dep_triples(TAG_REQUIRENAME, TAG_REQUIREFLAGS, TAG_REQUIREVERSION);
    pkg.conflicts = header.dep_triples(TAG_CONFLICTNAME, TAG_CONFLICTFLAGS, TAG_CONFLICTVERSION);
    pkg.obsoletes = header.dep_triples(TAG_OBSOLETENAME, TAG_OBSOLETEFLAGS, TAG_OBSOLETEVERSION);
    pkg.recommends =
        header.dep_triples(TAG_RECOMMENDNAME, TAG_RECOMMENDFLAGS, TAG_RECOMMENDVERSION);
    pkg.suggests = header.dep_triples(TAG_SUGGESTNAME, TAG_SUGGESTFLAGS, TAG_SUGGESTVERSION);

    let files = header.file_list(&nevra.to_string());

    Ok((HdlistEntry { package: pkg, files }, store_end))
}

struct IndexEntry {
    tag: u32,
    typ: u32,
    offset: usize,
    count: usize,
}

struct Header<'a> {
    index: Vec<IndexEntry>,
    store: &'a [u8],
}

impl Header<'_> {
    fn entry(&self, tag: u32) -> Option<&IndexEntry> {
        self.index.iter().find(|e| e.tag == tag)
    }

    fn get_string(&self, tag: u32) -> Option<String> {
        let e = self.entry(tag)?;
        if e.typ != TYPE_STRING && e.typ != TYPE_I18NSTRING {
            return None;
        }
        read_cstr(self.store, e.offset)
    }

    fn get_string_array(&self, tag: u32) -> Option<Vec<String>> {
        let e = self.entry(tag)?;
        if e.typ != TYPE_STRING_ARRAY && e.typ != TYPE_I18NSTRING {
            return None;
        }
        let mut out = Vec::with_capacity(e.count);
        let mut at = e.offset;
        for _ in 0..e.count {
            let s = read_cstr(self.store, at)?;
            at += s.len() + 1;
            out.push(s);
        }
        Some(out)
    }

    fn get_u32_array(&self, tag: u32) -> Option<Vec<u32>> {
        let e = self.entry(tag)?;
        if e.typ != TYPE_INT32 {
            return None;
        }
        (0..e.count)
            .map(|i| be_u32(self.store, e.offset + i * 4))
            .collect()
    }

    /// Assemble (name, flags, version) parallel arrays into capabilities
    fn dep_triples(&self, name_tag: u32, flags_tag: u32, version_tag: u32) -> Vec<Capability> {
        let Some(names) = self.get_string_array(name_tag) else {
            return Vec::new();
        };
        let flags = self.get_u32_array(flags_tag).unwrap_or_default();
        let versions = self.get_string_array(version_tag).unwrap_or_default();

        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let op = flags
                    .get(i)
                    .copied()
                    .map_or(CapOp::None, CapOp::from_rpm_flags);
                let version = versions.get(i).filter(|v| !v.is_empty());
                match (op, version) {
                    (CapOp::None, _) | (_, None) => Capability::unversioned(name),
                    (op, Some(v)) => Capability::versioned(name, op, Evr::parse(v)),
                }
            })
            .collect()
    }

    /// Reassemble file paths from BASENAMES/DIRNAMES/DIRINDEXES
    fn file_list(&self, nevra: &str) -> Vec<PackageFile> {
        let Some(basenames) = self.get_string_array(TAG_BASENAMES) else {
            return Vec::new();
        };
        let dirnames = self.get_string_array(TAG_DIRNAMES).unwrap_or_default();
        let dirindexes = self.get_u32_array(TAG_DIRINDEXES).unwrap_or_default();

        basenames
            .into_iter()
            .enumerate()
            .filter_map(|(i, base)| {
                let dir = dirnames.get(*dirindexes.get(i)? as usize)?;
                Some(PackageFile {
                    nevra: nevra.to_string(),
                    dir: dir.trim_end_matches('/').to_string(),
                    basename: base,
                })
            })
            .map(|mut f| {
                if f.dir.is_empty() {
                    f.dir = "/".to_string();
                }
                f
            })
            .collect()
    }
}

fn read_cstr(store: &[u8], offset: usize) -> Option<String> {
    let slice = store.get(offset..)?;
    let end = slice.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&slice[..end]).into_owned())
}

/// Test/round-trip support: emit a minimal header that [`parse_hdlist`]
/// reads back to the same record.
#[must_use]
pub fn write_header(entry: &HdlistEntry) -> Vec<u8> {
    let mut index: Vec<(u32, u32, Vec<u8>, usize)> = Vec::new();

    let push_string = |index: &mut Vec<(u32, u32, Vec<u8>, usize)>, tag: u32, s: &str| {
        let mut data = s.as_bytes().to_vec();
        data.push(0);
        index.push((tag, TYPE_STRING, data, 1));
    };
    let push_array = |index: &mut Vec<(u32, u32, Vec<u8>, usize)>, tag: u32, items: &[String]| {
        if items.is_empty() {
            return;
        }
        let mut data = Vec::new();
        for item in items {
            data.extend_from_slice(item.as_bytes());
            data.push(0);
        }
        index.push((tag, TYPE_STRING_ARRAY, data, items.len()));
    };
    let push_u32s = |index: &mut Vec<(u32, u32, Vec<u8>, usize)>, tag: u32, items: &[u32]| {
        if items.is_empty() {
            return;
        }
        let mut data = Vec::new();
        for v in items {
            data.extend_from_slice(&v.to_be_bytes());
        }
        index.push((tag, TYPE_INT32, data, items.len()));
    };

    let pkg = &entry.package;
    push_string(&mut index, TAG_NAME, &pkg.nevra.name);
    push_string(&mut index, TAG_VERSION, &pkg.nevra.version);
    push_string(&mut index, TAG_RELEASE, &pkg.nevra.release);
    push_string(&mut index, TAG_ARCH, &pkg.nevra.arch);
    push_u32s(&mut index, TAG_EPOCH, &[pkg.nevra.epoch]);
    push_string(&mut index, TAG_SUMMARY, &pkg.summary);
    push_string(&mut index, TAG_GROUP, &pkg.group);
    #[allow(clippy::cast_possible_truncation)]
    push_u32s(&mut index, TAG_SIZE, &[pkg.size as u32]);

    for (name_tag, flags_tag, version_tag, caps) in [
        (TAG_PROVIDENAME, TAG_PROVIDEFLAGS, TAG_PROVIDEVERSION, &pkg.provides),
        (TAG_REQUIRENAME, TAG_REQUIREFLAGS, TAG_REQUIREVERSION, &pkg.requires),
        (TAG_CONFLICTNAME, TAG_CONFLICTFLAGS, TAG_CONFLICTVERSION, &pkg.conflicts),
        (TAG_OBSOLETENAME, TAG_OBSOLETEFLAGS, TAG_OBSOLETEVERSION, &pkg.obsoletes),
    ] {
        let names: Vec<String> = caps.iter().map(|c| c.name.clone()).collect();
        let flags: Vec<u32> = caps
            .iter()
            .map(|c| match c.op {
                CapOp::None => 0,
                CapOp::Eq => 0x08,
                CapOp::Lt => 0x02,
                CapOp::Le => 0x0a,
                CapOp::Gt => 0x04,
                CapOp::Ge => 0x0c,
            })
            .collect();
        let versions: Vec<String> = caps
            .iter()
            .map(|c| c.evr.as_ref().map(ToString::to_string).unwrap_or_default())
            .collect();
        push_array(&mut index, name_tag, &names);
        push_u32s(&mut index, flags_tag, &flags);
        push_array(&mut index, version_tag, &versions);
    }

    if !entry.files.is_empty() {
        let mut dirs: Vec<String> = Vec::new();
        let mut dirindexes = Vec::new();
        let mut basenames = Vec::new();
        for f in &entry.files {
            let dir = if f.dir == "/" {
                "/".to_string()
            } else {
                format!("{}/", f.dir)
            };
            let idx = dirs.iter().position(|d| *d == dir).unwrap_or_else(|| {
                dirs.push(dir);
                dirs.len() - 1
            });
            #[allow(clippy::cast_possible_truncation)]
            dirindexes.push(idx as u32);
            basenames.push(f.basename.clone());
        }
        push_array(&mut index, TAG_BASENAMES, &basenames);
        push_array(&mut index, TAG_DIRNAMES, &dirs);
        push_u32s(&mut index, TAG_DIRINDEXES, &dirindexes);
    }

    // Lay out the store
    let mut store = Vec::new();
    let mut entries = Vec::new();
    for (tag, typ, data, count) in &index {
        if *typ == TYPE_INT32 {
            // 4-byte alignment for integer data
            while store.len() % 4 != 0 {
                store.push(0);
            }
        }
        entries.push((*tag, *typ, store.len() as u32, *count as u32));
        store.extend_from_slice(data);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&HEADER_MAGIC);
    out.push(1); // header version
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    out.extend_from_slice(&(store.len() as u32).to_be_bytes());
    for (tag, typ, offset, count) in entries {
        out.extend_from_slice(&tag.to_be_bytes());
        out.extend_from_slice(&typ.to_be_bytes());
        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&count.to_be_bytes());
    }
    out.extend_from_slice(&store);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> HdlistEntry {
        let mut pkg = PackageMeta::new(Nevra::new("bash", 0, "5.2", "3.mga10", "x86_64"));
        pkg.summary = "The GNU Bourne Again shell".into();
        pkg.group = "Shells".into();
        pkg.size = 1_234_567;
        pkg.provides = vec![
            Capability::parse("bash[== 5.2-3.mga10]"),
            Capability::parse("/bin/bash"),
        ];
        pkg.requires = vec![Capability::parse("libc.so.6"), Capability::parse("glibc[>= 2.38]")];
        HdlistEntry {
            package: pkg,
            files: vec![
                PackageFile::from_path("bash-5.2-3.mga10.x86_64", "/bin/bash"),
                PackageFile::from_path("bash-5.2-3.mga10.x86_64", "/usr/share/man/man1/bash.1.xz"),
            ],
        }
    }

    #[test]
    fn header_round_trip() {
        let entry = sample_entry();
        let blob = write_header(&entry);
        let parsed = parse_hdlist(&blob).unwrap();
        assert_eq!(parsed.len(), 1);

        let got = &parsed[0].package;
        assert_eq!(got.nevra, entry.package.nevra);
        assert_eq!(got.summary, entry.package.summary);
        assert_eq!(got.provides, entry.package.provides);
        assert_eq!(got.requires, entry.package.requires);
        assert_eq!(parsed[0].files, entry.files);
    }

    #[test]
    fn idempotent_over_concatenation() {
        let entry = sample_entry();
        let mut blob = write_header(&entry);
        blob.extend_from_slice(&write_header(&entry));
        let parsed = parse_hdlist(&blob).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].package.nevra, parsed[1].package.nevra);
    }

    #[test]
    fn resynchronizes_after_stray_bytes() {
        let entry = sample_entry();
        let mut blob = vec![0xde, 0xad, 0xbe, 0xef, 0x8e]; // noise, incl. partial magic
        blob.extend_from_slice(&write_header(&entry));
        let parsed = parse_hdlist(&blob).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].package.nevra.name, "bash");
    }

    #[test]
    fn truncated_header_is_an_error() {
        let entry = sample_entry();
        let blob = write_header(&entry);
        let cut = &blob[..blob.len() / 2];
        assert!(parse_hdlist(cut).is_err());
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(parse_hdlist(&[]).unwrap().is_empty());
    }
}
