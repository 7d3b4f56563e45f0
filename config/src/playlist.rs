use crate::PortalConfig;
use eyre::{
    bail,
    Context as _,
    Result,
};
use std::path::Path;
use url::Url;

/// Ordered list of video pages to watch. Derived from a line-oriented text
/// file: one video id or full URL per line, `#` starts a comment. Order is
/// playback order and duplicates are kept as written.
#[derive(Clone, Debug, PartialEq)]
pub struct Playlist {
    entries: Vec<Url>,
}

impl Playlist {
    pub fn load(path: impl AsRef<Path>, portal: &PortalConfig) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read video list from {path:?} (one video id or URL per line)"))?;
        let playlist = Self::parse(&content, portal)?;
        if playlist.is_empty() {
            bail!("video list {path:?} contains no entries");
        }
        Ok(playlist)
    }

    pub fn parse(content: &str, portal: &PortalConfig) -> Result<Self> {
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let url = if line.starts_with("http://") || line.starts_with("https://") {
                Url::parse(line).with_context(|| format!("invalid video URL in list: {line}"))?
            } else {
                portal.play_url(line)?
            };
            entries.push(url);
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn portal() -> PortalConfig {
        PortalConfig::default()
    }

    #[test]
    fn parses_ids_and_full_urls() {
        let content = "\
# intro lessons
808

https://example.com/some/video
1234
";
        let playlist = Playlist::parse(content, &portal()).unwrap();
        let urls: Vec<_> = playlist.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://wsdx.hzau.edu.cn/ybdy/play?v_id=808&r=video&t=2",
                "https://example.com/some/video",
                "https://wsdx.hzau.edu.cn/ybdy/play?v_id=1234&r=video&t=2",
            ]
        );
    }

    #[test]
    fn keeps_order_and_duplicates() {
        let playlist = Playlist::parse("2\n1\n2\n", &portal()).unwrap();
        let urls: Vec<_> = playlist.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://wsdx.hzau.edu.cn/ybdy/play?v_id=2&r=video&t=2",
                "https://wsdx.hzau.edu.cn/ybdy/play?v_id=1&r=video&t=2",
                "https://wsdx.hzau.edu.cn/ybdy/play?v_id=2&r=video&t=2",
            ]
        );
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let playlist = Playlist::parse("# only comments\n\n   \n", &portal()).unwrap();
        assert!(playlist.is_empty());
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(Playlist::parse("https://exa mple.com/x", &portal()).is_err());
    }

    #[test]
    fn load_fails_on_empty_list() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("video-list.txt");
        std::fs::write(&path, "# nothing here\n").unwrap();
        assert!(Playlist::load(&path, &portal()).is_err());
    }

    #[test]
    fn load_reads_entries_from_disk() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("video-list.txt");
        std::fs::write(&path, "42\n").unwrap();
        let playlist = Playlist::load(&path, &portal()).unwrap();
        assert_eq!(playlist.len(), 1);
    }
}
