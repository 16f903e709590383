//! Chunked local-to-remote file transfer.
//!
//! The source is read sequentially, one chunk in memory at a time, and each
//! chunk is appended to the remote destination in order. Nothing is retried
//! or rolled back: a failed transfer leaves the destination partially
//! written, and the next run (without `skip_if_exists`) replaces it.

use log::{debug, info, warn};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::{RemotingError, RemotingResult};
use crate::remote_fs::{join_remote, RemoteFs};
use crate::types::*;

/// Copy one local file to the remote destination.
pub async fn send_file<F>(session: &mut F, params: &FileCopyParams) -> RemotingResult<TransferOutcome>
where
    F: RemoteFs + ?Sized,
{
    if !session.is_open() {
        return Err(RemotingError::session_not_open(session.host(), session.state()));
    }
    if params.chunk_size == 0 {
        return Err(RemotingError::invalid_config("chunk size must be non-zero"));
    }

    let source = params.local_path.as_path();
    match tokio::fs::metadata(source).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(RemotingError::source_not_found(source)),
    }
    let mut file = tokio::fs::File::open(source)
        .await
        .map_err(|e| RemotingError::local_io(source, e))?;

    let destination = params.remote_path.as_str();
    let status = session
        .prepare_destination(destination, params.skip_if_exists)
        .await?;
    if status == DestinationStatus::Existing {
        info!(
            "Skipping {} -> {}:{} (already present)",
            source.display(),
            session.host(),
            destination
        );
        return Ok(TransferOutcome::Skipped);
    }

    info!(
        "Sending {} -> {}:{} ({:?})",
        source.display(),
        session.host(),
        destination,
        status
    );

    let mut buf = vec![0u8; params.chunk_size];
    let mut bytes: u64 = 0;
    let mut chunks: u64 = 0;

    loop {
        let n = read_chunk(&mut file, &mut buf)
            .await
            .map_err(|e| RemotingError::local_io(source, e))?;
        if n == 0 {
            break;
        }
        session.append_bytes(destination, &buf[..n]).await?;
        bytes += n as u64;
        chunks += 1;
        debug!("Chunk {} ({} bytes) appended to {}", chunks, n, destination);
    }

    // An empty source still has to exist remotely
    if chunks == 0 {
        session.append_bytes(destination, &[]).await?;
        chunks = 1;
    }

    match session.file_size(destination).await {
        Ok(size) if size != bytes => warn!(
            "Size mismatch for {}:{}: sent {} bytes, remote reports {}",
            session.host(),
            destination,
            bytes,
            size
        ),
        Ok(_) => {}
        Err(e) => debug!("Skipping size check for {}: {}", destination, e),
    }

    info!(
        "Sent {} bytes in {} chunk(s) to {}:{}",
        bytes,
        chunks,
        session.host(),
        destination
    );
    Ok(TransferOutcome::Completed { bytes, chunks })
}

/// Fill `buf` from `file` unless EOF comes first; returns the bytes read.
async fn read_chunk<R>(file: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Copy a local directory tree under `remote_dir`, preserving relative paths.
///
/// The first failing file aborts the walk; files already sent stay in place.
pub async fn send_folder<F>(
    session: &mut F,
    local_dir: &Path,
    remote_dir: &str,
    skip_if_exists: bool,
    chunk_size: usize,
) -> RemotingResult<FolderTransferSummary>
where
    F: RemoteFs + ?Sized,
{
    if !session.is_open() {
        return Err(RemotingError::session_not_open(session.host(), session.state()));
    }
    if !local_dir.is_dir() {
        return Err(RemotingError::source_not_found(local_dir));
    }

    info!(
        "Sending folder {} -> {}:{}",
        local_dir.display(),
        session.host(),
        remote_dir
    );

    let mut summary = FolderTransferSummary::default();
    let walker = walkdir::WalkDir::new(local_dir)
        .min_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(local_dir).to_path_buf();
            RemotingError::local_io(&path, e)
        })?;
        let relative = entry
            .path()
            .strip_prefix(local_dir)
            .map_err(|e| RemotingError::local_io(entry.path(), e))?;
        let target = join_remote(remote_dir, relative);

        if entry.file_type().is_dir() {
            session.make_dirs(&target).await?;
            continue;
        }

        let params = FileCopyParams::new(entry.path(), target)
            .skip_if_exists(skip_if_exists)
            .with_chunk_size(chunk_size);
        let outcome = send_file(session, &params).await?;
        summary.record(outcome);
    }

    info!(
        "Folder {} done: {} sent, {} skipped, {} bytes",
        local_dir.display(),
        summary.files_sent,
        summary.files_skipped,
        summary.bytes_sent
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_fs::RemoteSession;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, BTreeSet};

    /// In-memory remote filesystem recording every call.
    struct MemFs {
        state: SessionState,
        files: BTreeMap<String, Vec<u8>>,
        dirs: BTreeSet<String>,
        appends: Vec<(String, usize)>,
        calls: usize,
        fail_on_append: Option<usize>,
    }

    impl MemFs {
        fn new() -> Self {
            Self {
                state: SessionState::Opened,
                files: BTreeMap::new(),
                dirs: BTreeSet::new(),
                appends: Vec::new(),
                calls: 0,
                fail_on_append: None,
            }
        }
    }

    #[async_trait]
    impl RemoteSession for MemFs {
        fn host(&self) -> &str {
            "mem"
        }
        fn state(&self) -> SessionState {
            self.state
        }
        async fn close(&mut self) -> RemotingResult<()> {
            self.state = SessionState::Closed;
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteFs for MemFs {
        async fn check_exists(&mut self, path: &str) -> RemotingResult<bool> {
            self.calls += 1;
            Ok(self.files.contains_key(path))
        }
        async fn make_dirs(&mut self, dir: &str) -> RemotingResult<()> {
            self.calls += 1;
            self.dirs.insert(dir.to_string());
            Ok(())
        }
        async fn delete_file(&mut self, path: &str) -> RemotingResult<()> {
            self.calls += 1;
            self.files.remove(path);
            Ok(())
        }
        async fn append_bytes(&mut self, path: &str, data: &[u8]) -> RemotingResult<()> {
            self.calls += 1;
            if self.fail_on_append == Some(self.appends.len()) {
                self.state = SessionState::Broken;
                return Err(RemotingError::transport("connection reset"));
            }
            self.appends.push((path.to_string(), data.len()));
            self.files
                .entry(path.to_string())
                .or_default()
                .extend_from_slice(data);
            Ok(())
        }
        async fn file_size(&mut self, path: &str) -> RemotingResult<u64> {
            self.calls += 1;
            Ok(self.files.get(path).map_or(0, |f| f.len() as u64))
        }
    }

    fn source(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn chunks_follow_boundaries() {
        let tmp = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..2_621_440u32).map(|i| (i % 251) as u8).collect();
        let src = source(&tmp, "payload.bin", &data);
        let mut fs = MemFs::new();

        let outcome = send_file(&mut fs, &FileCopyParams::new(&src, "bench/payload.bin"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TransferOutcome::Completed {
                bytes: 2_621_440,
                chunks: 3
            }
        );
        let sizes: Vec<usize> = fs.appends.iter().map(|(_, n)| *n).collect();
        assert_eq!(sizes, vec![1_048_576, 1_048_576, 524_288]);
        assert_eq!(fs.files["bench/payload.bin"], data);
        assert!(fs.dirs.contains("bench"));
    }

    #[tokio::test]
    async fn exact_multiple_has_full_last_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(&tmp, "a.bin", &[7u8; 12]);
        let mut fs = MemFs::new();

        send_file(&mut fs, &FileCopyParams::new(&src, "a.bin").with_chunk_size(4))
            .await
            .unwrap();
        let sizes: Vec<usize> = fs.appends.iter().map(|(_, n)| *n).collect();
        assert_eq!(sizes, vec![4, 4, 4]);
    }

    #[tokio::test]
    async fn skip_if_exists_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(&tmp, "a.txt", b"hello");
        let mut fs = MemFs::new();
        let params = FileCopyParams::new(&src, "a.txt").skip_if_exists(true);

        send_file(&mut fs, &params).await.unwrap();
        let before = fs.files.clone();
        let appends = fs.appends.len();

        let second = send_file(&mut fs, &params).await.unwrap();
        assert_eq!(second, TransferOutcome::Skipped);
        assert_eq!(fs.files, before);
        assert_eq!(fs.appends.len(), appends);
    }

    #[tokio::test]
    async fn overwrite_leaves_no_residue() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(&tmp, "a.txt", b"short");
        let mut fs = MemFs::new();
        fs.files
            .insert("a.txt".into(), b"a much longer previous payload".to_vec());

        send_file(&mut fs, &FileCopyParams::new(&src, "a.txt"))
            .await
            .unwrap();
        assert_eq!(fs.files["a.txt"], b"short");
    }

    #[tokio::test]
    async fn closed_session_makes_no_remote_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(&tmp, "a.txt", b"x");
        let mut fs = MemFs::new();
        fs.state = SessionState::Closed;

        let err = send_file(&mut fs, &FileCopyParams::new(&src, "a.txt"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::RemotingErrorKind::SessionNotOpen);
        assert_eq!(fs.calls, 0);
    }

    #[tokio::test]
    async fn missing_source_is_a_precondition_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let mut fs = MemFs::new();

        let err = send_file(
            &mut fs,
            &FileCopyParams::new(tmp.path().join("absent.bin"), "absent.bin"),
        )
        .await
        .unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(fs.calls, 0);
    }

    #[tokio::test]
    async fn transport_failure_leaves_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(&tmp, "a.bin", &[1u8; 10]);
        let mut fs = MemFs::new();
        fs.fail_on_append = Some(1);

        let err = send_file(&mut fs, &FileCopyParams::new(&src, "a.bin").with_chunk_size(4))
            .await
            .unwrap_err();
        assert!(err.is_remote_failure());
        assert_eq!(fs.state, SessionState::Broken);
        assert_eq!(fs.files["a.bin"].len(), 4);
    }

    #[tokio::test]
    async fn empty_source_creates_empty_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(&tmp, "empty", b"");
        let mut fs = MemFs::new();

        let outcome = send_file(&mut fs, &FileCopyParams::new(&src, "empty"))
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Completed { bytes: 0, chunks: 1 });
        assert!(fs.files["empty"].is_empty());
    }

    #[tokio::test]
    async fn folder_structure_is_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("a.txt"), b"A").unwrap();
        std::fs::write(root.join("sub").join("b.txt"), b"BB").unwrap();
        let mut fs = MemFs::new();

        let summary = send_folder(&mut fs, &root, "dest", false, DEFAULT_CHUNK_SIZE)
            .await
            .unwrap();

        assert_eq!(summary.files_sent, 2);
        assert_eq!(summary.bytes_sent, 3);
        assert_eq!(fs.files["dest/a.txt"], b"A");
        assert_eq!(fs.files["dest/sub/b.txt"], b"BB");
        assert!(fs.dirs.contains("dest/sub"));
    }
}
