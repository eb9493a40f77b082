//! File name validation
//!
//! Watched files must be named `<group>_<title>.<ext>`. The first underscore
//! splits the stem into group and title; both must be non-empty, and the
//! extension must be present. The title may contain further underscores.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("file name '{0}' has no extension")]
    MissingExtension(String),

    #[error("file name '{0}' has no '_' separating group and title")]
    MissingSeparator(String),

    #[error("file name '{0}' has an empty group")]
    EmptyGroup(String),

    #[error("file name '{0}' has an empty title")]
    EmptyTitle(String),
}

/// A validated `<group>_<title>.<ext>` file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName<'a> {
    pub group: &'a str,
    pub title: &'a str,
    /// Extension without the leading dot.
    pub extension: &'a str,
}

impl ParsedName<'_> {
    /// Title with its extension, e.g. `clip1.mp4`.
    pub fn title_with_extension(&self) -> String {
        format!("{}.{}", self.title, self.extension)
    }
}

pub fn parse_file_name(name: &str) -> Result<ParsedName<'_>, NameError> {
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, ext),
        _ => return Err(NameError::MissingExtension(name.to_string())),
    };

    let (group, title) = stem
        .split_once('_')
        .ok_or_else(|| NameError::MissingSeparator(name.to_string()))?;

    if group.is_empty() {
        return Err(NameError::EmptyGroup(name.to_string()));
    }
    if title.is_empty() {
        return Err(NameError::EmptyTitle(name.to_string()));
    }

    Ok(ParsedName {
        group,
        title,
        extension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_group_title_extension() {
        let parsed = parse_file_name("alpha_clip1.mp4").unwrap();
        assert_eq!(parsed.group, "alpha");
        assert_eq!(parsed.title, "clip1");
        assert_eq!(parsed.extension, "mp4");
        assert_eq!(parsed.title_with_extension(), "clip1.mp4");
    }

    #[test]
    fn first_underscore_splits() {
        let parsed = parse_file_name("game_boss_fight_final.mkv").unwrap();
        assert_eq!(parsed.group, "game");
        assert_eq!(parsed.title, "boss_fight_final");
    }

    #[test]
    fn dots_in_stem_keep_last_extension() {
        let parsed = parse_file_name("team_match.v2.mp4").unwrap();
        assert_eq!(parsed.title, "match.v2");
        assert_eq!(parsed.extension, "mp4");
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(
            parse_file_name("bad name.mp4"),
            Err(NameError::MissingSeparator("bad name.mp4".to_string()))
        );
        assert_eq!(
            parse_file_name("_clip.mp4"),
            Err(NameError::EmptyGroup("_clip.mp4".to_string()))
        );
        assert_eq!(
            parse_file_name("alpha_.mp4"),
            Err(NameError::EmptyTitle("alpha_.mp4".to_string()))
        );
        assert!(matches!(
            parse_file_name("alpha_clip"),
            Err(NameError::MissingExtension(_))
        ));
        assert!(matches!(
            parse_file_name("alpha_clip."),
            Err(NameError::MissingExtension(_))
        ));
        assert!(matches!(
            parse_file_name(".mp4"),
            Err(NameError::MissingExtension(_))
        ));
    }
}
