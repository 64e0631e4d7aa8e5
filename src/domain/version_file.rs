use super::version::Version;
use crate::error::{ReleaseError, Result};
use regex::Regex;

/// Parsed view of the version header holding the three version macros.
///
/// The file defines `...MAJOR_VERSION`, `...MINOR_VERSION` and
/// `...MICRO_VERSION` integer macros; everything else in it is opaque and
/// must survive a rewrite byte-for-byte. Parsing captures the position and
/// surrounding text of each macro line so rendering only ever substitutes
/// the three numbers.
#[derive(Debug, Clone)]
pub struct VersionFile {
    segments: Vec<String>,
    major: MacroLine,
    minor: MacroLine,
    micro: MacroLine,
}

#[derive(Debug, Clone)]
struct MacroLine {
    index: usize,
    prefix: String,
    value: u32,
    suffix: String,
}

impl VersionFile {
    /// Parse the header text, locating all three version macros.
    pub fn parse(text: &str) -> Result<Self> {
        // split_inclusive keeps each line's terminator so render is lossless
        let segments: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();

        let major = Self::find_macro(&segments, "MAJOR")?;
        let minor = Self::find_macro(&segments, "MINOR")?;
        let micro = Self::find_macro(&segments, "MICRO")?;

        Ok(VersionFile {
            segments,
            major,
            minor,
            micro,
        })
    }

    fn find_macro(segments: &[String], component: &str) -> Result<MacroLine> {
        let pattern = format!(r"^(#define\s+\w*{}_VERSION\s+)(\d+)(.*)$", component);
        let re = Regex::new(&pattern).expect("macro pattern is valid");

        for (index, segment) in segments.iter().enumerate() {
            let line = segment.strip_suffix('\n').unwrap_or(segment);
            if let Some(captures) = re.captures(line) {
                let value = captures[2].parse::<u32>().map_err(|_| {
                    ReleaseError::version(format!(
                        "{}_VERSION value out of range: {}",
                        component, &captures[2]
                    ))
                })?;
                return Ok(MacroLine {
                    index,
                    prefix: captures[1].to_string(),
                    value,
                    suffix: captures[3].to_string(),
                });
            }
        }
        Err(ReleaseError::version(format!(
            "No {}_VERSION macro found in version file",
            component
        )))
    }

    /// The version currently recorded in the file.
    pub fn current(&self) -> Version {
        Version::new(self.major.value, self.minor.value, self.micro.value)
    }

    /// Re-render the file with a new version, preserving all other bytes.
    pub fn render_with(&self, version: Version) -> String {
        let mut out = String::new();
        for (index, segment) in self.segments.iter().enumerate() {
            if index == self.major.index {
                out.push_str(&Self::render_macro(&self.major, segment, version.major));
            } else if index == self.minor.index {
                out.push_str(&Self::render_macro(&self.minor, segment, version.minor));
            } else if index == self.micro.index {
                out.push_str(&Self::render_macro(&self.micro, segment, version.micro));
            } else {
                out.push_str(segment);
            }
        }
        out
    }

    fn render_macro(line: &MacroLine, segment: &str, value: u32) -> String {
        let newline = if segment.ends_with('\n') { "\n" } else { "" };
        format!("{}{}{}{}", line.prefix, value, line.suffix, newline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
#ifndef VERSION_H\n\
#define VERSION_H\n\
\n\
#define SDK_MAJOR_VERSION 4\n\
#define SDK_MINOR_VERSION 19\n\
#define SDK_MICRO_VERSION 2\n\
\n\
// unrelated trailing comment\n\
#endif\n";

    #[test]
    fn test_parse_reads_current_version() {
        let file = VersionFile::parse(HEADER).unwrap();
        assert_eq!(file.current(), Version::new(4, 19, 2));
    }

    #[test]
    fn test_render_with_same_version_is_identity() {
        let file = VersionFile::parse(HEADER).unwrap();
        assert_eq!(file.render_with(Version::new(4, 19, 2)), HEADER);
    }

    #[test]
    fn test_render_substitutes_only_the_numbers() {
        let file = VersionFile::parse(HEADER).unwrap();
        let out = file.render_with(Version::new(5, 0, 0));
        assert!(out.contains("#define SDK_MAJOR_VERSION 5\n"));
        assert!(out.contains("#define SDK_MINOR_VERSION 0\n"));
        assert!(out.contains("#define SDK_MICRO_VERSION 0\n"));
        assert!(out.contains("#ifndef VERSION_H\n"));
        assert!(out.contains("// unrelated trailing comment\n"));
        assert_eq!(out.lines().count(), HEADER.lines().count());
    }

    #[test]
    fn test_trailing_whitespace_preserved() {
        let header = "#define APP_MAJOR_VERSION 1   \n\
#define APP_MINOR_VERSION 2\n\
#define APP_MICRO_VERSION 3\n";
        let file = VersionFile::parse(header).unwrap();
        let out = file.render_with(Version::new(1, 2, 4));
        assert!(out.contains("#define APP_MAJOR_VERSION 1   \n"));
        assert!(out.contains("#define APP_MICRO_VERSION 4\n"));
    }

    #[test]
    fn test_missing_macro_is_an_error() {
        let header = "#define SDK_MAJOR_VERSION 1\n#define SDK_MINOR_VERSION 2\n";
        let err = VersionFile::parse(header).unwrap_err();
        assert!(err.to_string().contains("MICRO_VERSION"));
    }

    #[test]
    fn test_file_without_trailing_newline() {
        let header = "#define X_MAJOR_VERSION 1\n\
#define X_MINOR_VERSION 2\n\
#define X_MICRO_VERSION 3";
        let file = VersionFile::parse(header).unwrap();
        assert_eq!(file.render_with(Version::new(1, 2, 3)), header);
        let out = file.render_with(Version::new(1, 2, 4));
        assert!(out.ends_with("#define X_MICRO_VERSION 4"));
    }
}
