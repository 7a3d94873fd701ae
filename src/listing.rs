//! HTML listing for directory requests.

use std::cmp::Ordering;
use std::io;
use std::path::Path;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub name: String,
    /// URL path of the entry.
    pub path: String,
    pub is_dir: bool,
}

/// Reads the entries of `absolute`, served at URL path `path`.
///
/// Dotfiles are skipped unless `hidden`. Directories sort before files, then
/// by name. Unless `path` is the root, a `..` entry pointing at the parent
/// comes first.
pub async fn read_dirents(path: &str, absolute: &Path, hidden: bool) -> io::Result<Vec<Dirent>> {
    let mut dirents = Vec::new();
    let mut entries = tokio::fs::read_dir(absolute).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !hidden && name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        dirents.push(Dirent { path: join_url(path, &name), name, is_dir });
    }

    dirents.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });

    if path != "/" {
        dirents.insert(0, Dirent { name: "..".to_string(), path: parent_url(path), is_dir: true });
    }

    Ok(dirents)
}

/// Renders entries as links separated by `<br>`; directories get a trailing `/`.
pub fn render_dirents(dirents: &[Dirent]) -> String {
    dirents
        .iter()
        .map(|dirent| {
            let href = dirent
                .path
                .split('/')
                .map(|segment| urlencoding::encode(segment).into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let suffix = if dirent.is_dir && dirent.name != ".." { "/" } else { "" };
            format!("<a href=\"{}\">{}{}</a>", href, escape_html(&dirent.name), suffix)
        })
        .collect::<Vec<_>>()
        .join("<br>")
}

fn join_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

fn parent_url(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> io::Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("b.txt"), "b").await?;
        tokio::fs::write(dir.path().join("a.txt"), "a").await?;
        tokio::fs::write(dir.path().join(".secret"), "s").await?;
        tokio::fs::create_dir(dir.path().join("zdir")).await?;
        Ok(dir)
    }

    #[tokio::test]
    async fn test_directories_first_hidden_skipped() -> io::Result<()> {
        let dir = fixture().await?;
        let dirents = read_dirents("/", dir.path(), false).await?;
        let names: Vec<_> = dirents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(vec!["zdir", "a.txt", "b.txt"], names);
        assert_eq!("/zdir", dirents[0].path);
        Ok(())
    }

    #[tokio::test]
    async fn test_hidden_and_parent_entry() -> io::Result<()> {
        let dir = fixture().await?;
        let dirents = read_dirents("/files/sub", dir.path(), true).await?;
        assert_eq!(Dirent { name: "..".into(), path: "/files".into(), is_dir: true }, dirents[0]);
        assert!(dirents.iter().any(|d| d.name == ".secret" && d.path == "/files/sub/.secret"));
        Ok(())
    }

    #[test]
    fn test_parent_url() {
        assert_eq!("/", parent_url("/files"));
        assert_eq!("/files", parent_url("/files/sub"));
        assert_eq!("/files", parent_url("/files/sub/"));
    }

    #[test]
    fn test_render() {
        let dirents = vec![
            Dirent { name: "..".into(), path: "/".into(), is_dir: true },
            Dirent { name: "docs".into(), path: "/docs".into(), is_dir: true },
            Dirent { name: "a b<c>.txt".into(), path: "/a b<c>.txt".into(), is_dir: false },
        ];
        assert_eq!(
            "<a href=\"/\">..</a><br><a href=\"/docs\">docs/</a><br><a href=\"/a%20b%3Cc%3E.txt\">a b&lt;c&gt;.txt</a>",
            render_dirents(&dirents)
        );
    }
}
