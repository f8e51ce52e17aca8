//! Legacy urpmi.cfg reader
//!
//! The historical media configuration is a global stanza followed by
//! `<name> <url> { key value; flag; }` blocks. We import it on demand
//! and never write it back.

use urpm_errors::{ConfigError, Error};

/// One media block out of urpmi.cfg
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMedia {
    pub name: String,
    pub url: String,
    pub ignore: bool,
    pub update: bool,
    /// key-media-info URL or other key=value entries we preserve verbatim
    pub options: Vec<(String, String)>,
}

/// Parse the contents of an urpmi.cfg file.
///
/// # Errors
///
/// Returns `ConfigError::LegacyParse` when a block is malformed
/// (unterminated brace, missing media name).
pub fn parse_urpmi_cfg(input: &str) -> Result<Vec<LegacyMedia>, Error> {
    let mut media = Vec::new();
    let mut lines = input.lines().enumerate().peekable();

    while let Some((lineno, raw)) = lines.next() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        let Some(head) = line.strip_suffix('{').map(str::trim) else {
            // Stray tokens outside a block are tolerated (historic cfgs
            // carry bare option lines at the top level)
            continue;
        };

        // The global stanza has an empty head; skip its body
        let mut body = Vec::new();
        let mut closed = false;
        for (_, raw) in lines.by_ref() {
            let inner = strip_comment(raw).trim().to_string();
            if inner == "}" {
                closed = true;
                break;
            }
            if !inner.is_empty() {
                body.push(inner);
            }
        }
        if !closed {
            return Err(ConfigError::LegacyParse {
                line: lineno + 1,
                message: "unterminated '{' block".into(),
            }
            .into());
        }

        if head.is_empty() {
            continue; // global stanza
        }

        let (name, url) = split_head(head).ok_or_else(|| {
            Error::from(ConfigError::LegacyParse {
                line: lineno + 1,
                message: format!("expected '<name> <url> {{': {head}"),
            })
        })?;

        let mut entry = LegacyMedia {
            name,
            url,
            ignore: false,
            update: false,
            options: Vec::new(),
        };

        for item in body.iter().flat_map(|l| l.split(';')) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            match item.split_once(char::is_whitespace) {
                None if item == "ignore" => entry.ignore = true,
                None if item == "update" => entry.update = true,
                None => entry.options.push((item.to_string(), String::new())),
                Some((k, v)) => entry
                    .options
                    .push((k.to_string(), v.trim().to_string())),
            }
        }

        media.push(entry);
    }

    Ok(media)
}

/// The media name may contain escaped spaces (`\ `); the URL is the last
/// whitespace-separated token.
fn split_head(head: &str) -> Option<(String, String)> {
    let (name_part, url) = head.rsplit_once(char::is_whitespace)?;
    let name = name_part.trim().replace("\\ ", " ");
    if name.is_empty() || url.is_empty() {
        return None;
    }
    Some((name, url.to_string()))
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
# urpmi config
{
  downloader wget
}

Core\ Release https://mirrors.kernel.org/mageia/distrib/9/x86_64/media/core/release {
  key-ids 80420f66
}

Core\ Updates https://mirrors.kernel.org/mageia/distrib/9/x86_64/media/core/updates {
  update
  key-ids 80420f66
}

Tainted\ Release https://example.org/tainted/release {
  ignore
}
";

    #[test]
    fn parses_blocks_and_flags() {
        let media = parse_urpmi_cfg(SAMPLE).unwrap();
        assert_eq!(media.len(), 3);

        assert_eq!(media[0].name, "Core Release");
        assert!(media[0].url.ends_with("core/release"));
        assert!(!media[0].update);

        assert!(media[1].update);
        assert_eq!(media[1].options, vec![("key-ids".into(), "80420f66".into())]);

        assert!(media[2].ignore);
    }

    #[test]
    fn global_stanza_is_skipped() {
        let media = parse_urpmi_cfg("{\n downloader curl\n}\n").unwrap();
        assert!(media.is_empty());
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let err = parse_urpmi_cfg("Name http://u {\n update\n").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(parse_urpmi_cfg("").unwrap().is_empty());
    }
}
