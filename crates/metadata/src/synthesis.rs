//! Synthesis metadata parser
//!
//! A synthesis file is a UTF-8 stream of `@`-delimited lines. Dependency
//! tags accumulate into a staging record; an `@info` line closes the
//! record and emits it:
//!
//! ```text
//! @provides@mta@sendmail[== 1.0-1]
//! @requires@/bin/sh@libc.so.6
//! @summary@A mail transfer agent
//! @info@sendmail-1.0-1.x86_64@0@123456@System/Servers
//! ```
//!
//! Provide names may contain `@` inside parentheses
//! (`bundled(npm(@scope/pkg))`), so splitting is paren-aware.

use urpm_types::{Capability, Nevra, PackageMeta};

use crate::compression::decompress;
use urpm_errors::{Error, MetadataError};

/// Parse a (possibly compressed) synthesis blob into package records.
///
/// Unknown tags are ignored; tags with no closing `@info` are dropped.
/// A zero-package blob yields an empty vector.
///
/// # Errors
///
/// Returns an error when decompression fails or the stream is not UTF-8.
pub fn parse_synthesis(data: &[u8]) -> Result<Vec<PackageMeta>, Error> {
    let raw = decompress(data)?;
    let text = std::str::from_utf8(&raw).map_err(|e| {
        Error::from(MetadataError::MalformedLine {
            line: 0,
            message: format!("synthesis is not UTF-8: {e}"),
        })
    })?;
    Ok(parse_synthesis_str(text))
}

/// Parse decompressed synthesis text.
#[must_use]
pub fn parse_synthesis_str(text: &str) -> Vec<PackageMeta> {
    let mut packages = Vec::new();
    let mut staging = Staging::default();

    for line in text.lines() {
        if !line.starts_with('@') {
            continue;
        }
        let fields = split_fields(line);
        let Some((tag, values)) = fields.split_first() else {
            continue;
        };

        match tag.as_str() {
            "provides" => staging.provides.extend(parse_caps(values)),
            "requires" => staging.requires.extend(parse_caps(values)),
            "conflicts" => staging.conflicts.extend(parse_caps(values)),
            "obsoletes" => staging.obsoletes.extend(parse_caps(values)),
            "recommends" => staging.recommends.extend(parse_caps(values)),
            "suggests" => staging.suggests.extend(parse_caps(values)),
            "summary" => staging.summary = values.first().cloned().unwrap_or_default(),
            "filesize" => {
                staging.file_size = values.first().and_then(|v| v.parse().ok());
            }
            "info" => {
                if let Some(pkg) = staging.close(values) {
                    packages.push(pkg);
                }
                staging = Staging::default();
            }
            // Unknown tag: ignored, not fatal
            _ => {}
        }
    }

    packages
}

/// Set of NEVRAs present in a synthesis blob, via a single cheap pass.
///
/// # Errors
///
/// Same failure modes as [`parse_synthesis`].
pub fn scan_nevras(data: &[u8]) -> Result<Vec<String>, Error> {
    let raw = decompress(data)?;
    let text = std::str::from_utf8(&raw).map_err(|e| {
        Error::from(MetadataError::MalformedLine {
            line: 0,
            message: format!("synthesis is not UTF-8: {e}"),
        })
    })?;
    Ok(text
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("@info@")?;
            let end = rest.find('@').unwrap_or(rest.len());
            Some(rest[..end].to_string())
        })
        .collect())
}

/// Emit records in canonical synthesis form (used for round-trip tests
/// and by the daemon when seeding a peer).
#[must_use]
pub fn write_synthesis(packages: &[PackageMeta]) -> String {
    let mut out = String::new();
    for pkg in packages {
        for (tag, caps) in [
            ("provides", &pkg.provides),
            ("requires", &pkg.requires),
            ("conflicts", &pkg.conflicts),
            ("obsoletes", &pkg.obsoletes),
            ("recommends", &pkg.recommends),
            ("suggests", &pkg.suggests),
        ] {
            if !caps.is_empty() {
                out.push('@');
                out.push_str(tag);
                for cap in caps {
                    out.push('@');
                    out.push_str(&cap.to_string());
                }
                out.push('\n');
            }
        }
        if !pkg.summary.is_empty() {
            out.push_str("@summary@");
            out.push_str(&pkg.summary);
            out.push('\n');
        }
        if let Some(fs) = pkg.file_size {
            out.push_str(&format!("@filesize@{fs}\n"));
        }
        out.push_str(&format!(
            "@info@{}@{}@{}@{}\n",
            pkg.nevra, pkg.nevra.epoch, pkg.size, pkg.group
        ));
    }
    out
}

#[derive(Default)]
struct Staging {
    provides: Vec<Capability>,
    requires: Vec<Capability>,
    conflicts: Vec<Capability>,
    obsoletes: Vec<Capability>,
    recommends: Vec<Capability>,
    suggests: Vec<Capability>,
    summary: String,
    file_size: Option<u64>,
}

impl Staging {
    /// `@info@NEVRA@epoch@size@group`; missing epoch defaults to 0,
    /// missing group to empty.
    fn close(self, values: &[String]) -> Option<PackageMeta> {
        let nevra_str = values.first()?;
        if nevra_str.is_empty() {
            return None;
        }
        let epoch = values.get(1).and_then(|v| v.parse().ok()).unwrap_or(0);
        let size = values.get(2).and_then(|v| v.parse().ok()).unwrap_or(0);
        let group = values.get(3).cloned().unwrap_or_default();

        let mut pkg = PackageMeta::new(Nevra::parse_with_epoch(nevra_str, epoch));
        pkg.summary = self.summary;
        pkg.group = group;
        pkg.size = size;
        pkg.file_size = self.file_size;
        pkg.provides = self.provides;
        pkg.requires = self.requires;
        pkg.conflicts = self.conflicts;
        pkg.obsoletes = self.obsoletes;
        pkg.recommends = self.recommends;
        pkg.suggests = self.suggests;
        Some(pkg)
    }
}

/// Split on `@` outside parentheses; the leading empty field is dropped.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for ch in line.chars().skip(1) {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            '@' if depth == 0 => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

fn parse_caps(values: &[String]) -> impl Iterator<Item = Capability> + '_ {
    values
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| Capability::parse(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use urpm_types::CapOp;

    const SAMPLE: &str = "\
@provides@mta@sendmail[== 1.0-1]
@requires@/bin/sh@libc.so.6@libssl[>= 3.0]
@summary@A mail transfer agent
@info@sendmail-1.0-1.x86_64@0@123456@System/Servers
@provides@postfix[== 3.0-1]@mta
@summary@Fast and secure MTA
@filesize@2097152
@info@postfix-3.0-1.x86_64@@2345678@System/Servers
";

    #[test]
    fn parses_records() {
        let pkgs = parse_synthesis_str(SAMPLE);
        assert_eq!(pkgs.len(), 2);

        let sendmail = &pkgs[0];
        assert_eq!(sendmail.nevra.name, "sendmail");
        assert_eq!(sendmail.summary, "A mail transfer agent");
        assert_eq!(sendmail.group, "System/Servers");
        assert_eq!(sendmail.size, 123_456);
        assert_eq!(sendmail.provides.len(), 2);
        assert_eq!(sendmail.requires.len(), 3);
        assert_eq!(sendmail.requires[2].op, CapOp::Ge);

        let postfix = &pkgs[1];
        // Empty epoch field defaults to 0
        assert_eq!(postfix.nevra.epoch, 0);
        assert_eq!(postfix.file_size, Some(2_097_152));
    }

    #[test]
    fn empty_input_parses_to_empty_set() {
        assert!(parse_synthesis_str("").is_empty());
        assert!(parse_synthesis(b"").unwrap().is_empty());
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let pkgs = parse_synthesis_str(
            "@newfangled@x@y\n@info@pkg-1.0-1.noarch@0@10@Group\n",
        );
        assert_eq!(pkgs.len(), 1);
    }

    #[test]
    fn missing_info_fields_use_defaults() {
        let pkgs = parse_synthesis_str("@info@pkg-1.0-1.noarch\n");
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].nevra.epoch, 0);
        assert_eq!(pkgs[0].size, 0);
        assert_eq!(pkgs[0].group, "");
    }

    #[test]
    fn at_inside_parens_stays_in_field() {
        let pkgs = parse_synthesis_str(
            "@provides@bundled(npm(@xterm/addon-canvas))\n@info@x-1-1.noarch@0@1@G\n",
        );
        assert_eq!(
            pkgs[0].provides[0].name,
            "bundled(npm(@xterm/addon-canvas))"
        );
    }

    #[test]
    fn dangling_tags_without_info_are_dropped() {
        let pkgs = parse_synthesis_str("@provides@orphan\n@summary@No info line\n");
        assert!(pkgs.is_empty());
    }

    #[test]
    fn scan_matches_parse() {
        let nevras = scan_nevras(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            nevras,
            vec!["sendmail-1.0-1.x86_64", "postfix-3.0-1.x86_64"]
        );
    }

    #[test]
    fn round_trip_is_stable() {
        let pkgs = parse_synthesis_str(SAMPLE);
        let emitted = write_synthesis(&pkgs);
        let reparsed = parse_synthesis_str(&emitted);
        assert_eq!(pkgs.len(), reparsed.len());
        for (a, b) in pkgs.iter().zip(&reparsed) {
            assert_eq!(a.nevra, b.nevra);
            assert_eq!(a.provides, b.provides);
            assert_eq!(a.requires, b.requires);
            assert_eq!(a.summary, b.summary);
            assert_eq!(a.size, b.size);
            assert_eq!(a.group, b.group);
        }
    }
}
