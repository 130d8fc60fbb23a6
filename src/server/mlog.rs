//! Serving log categories
// (c) 2026 rupd contributors

use std::path::{Component, Path, PathBuf};

use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt as _, AsyncWrite},
};
use tracing::debug;

use super::{
    error::{reason, SessionError},
    ServerSettings,
};
use crate::protocol::{FileInfo, Message, MessageStream, Tag, MAX_CHUNK_SIZE};

/// Resolves a category name to its directory under the log root.
///
/// Only a single plain path component is accepted.
pub(crate) fn category_dir(log_root: &Path, category: &str) -> Option<PathBuf> {
    let mut components = Path::new(category).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Some(log_root.join(name)),
        _ => None,
    }
}

/// Lists the log files of a category directory, in name order
async fn list_logs(dir: &Path, suffix: &str) -> std::io::Result<Vec<(String, PathBuf, u64)>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            debug!("skipping non-UTF-8 file name {:?}", entry.file_name());
            continue;
        };
        if !name.ends_with(suffix) {
            continue;
        }
        let meta = entry.metadata().await?;
        if meta.is_file() {
            found.push((name, entry.path(), meta.len()));
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Streams every log file of a category to the client, then acknowledges.
///
/// For each file: `MINF name,size`, the contents in `MDAT` chunks, then `STEP name`.
/// Exactly `size` bytes are sent for each file, even if it grows meanwhile.
pub(crate) async fn send_category<S>(
    stream: &mut MessageStream<S>,
    settings: &ServerSettings,
    category: &str,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let config = &settings.config;
    let Some(dir) = category_dir(&config.log_root, category) else {
        debug!("refusing log category {category:?}");
        return Err(SessionError::violation(reason::DIRECTORY_NOT_FOUND));
    };
    if !dir.is_dir() {
        debug!("no log directory {dir:?}");
        return Err(SessionError::violation(reason::DIRECTORY_NOT_FOUND));
    }

    let files = list_logs(&dir, &config.log_suffix)
        .await
        .map_err(SessionError::io(format!("listing {}", dir.display())))?;
    debug!("sending {} files from {dir:?}", files.len());

    let mut buffer = vec![0u8; MAX_CHUNK_SIZE];
    for (name, path, size) in files {
        let file = File::open(&path)
            .await
            .map_err(SessionError::io(format!("opening {}", path.display())))?;
        stream
            .send_text(Tag::Minf, FileInfo::new(name.as_str(), size).to_string())
            .await?;

        let mut reader = file.take(size);
        let mut sent = 0u64;
        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(SessionError::io(format!("reading {}", path.display())))?;
            if n == 0 {
                break;
            }
            stream
                .send(&Message::new(Tag::Mdat, buffer[..n].to_vec()))
                .await?;
            sent += n as u64;
        }
        if sent < size {
            // The file shrank after we listed it; the client will notice the shortfall.
            debug!("{name}: sent {sent} of {size} bytes");
        }
        stream.send_text(Tag::Step, &name).await?;
    }
    stream.send_bare(Tag::Ack).await?;
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{category_dir, list_logs};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::path::Path;

    #[rstest]
    #[case("robot", Some("/logs/robot"))]
    #[case("", None)]
    #[case("..", None)]
    #[case("a/b", None)]
    #[case("/etc", None)]
    #[case(".", None)]
    fn categories(#[case] category: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            category_dir(Path::new("/logs"), category),
            expected.map(std::path::PathBuf::from)
        );
    }

    #[tokio::test]
    async fn listing_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.log"), "bb").unwrap();
        std::fs::write(dir.path().join("a.log"), "a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("dir.log")).unwrap();

        let found = list_logs(dir.path(), ".log").await.unwrap();
        let names: Vec<_> = found.iter().map(|(n, _, s)| (n.as_str(), *s)).collect();
        assert_eq!(names, vec![("a.log", 1), ("b.log", 2)]);
    }
}
