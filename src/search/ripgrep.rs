//! `rg` subprocess backend.
//!
//! Output is requested with `--null` so paths containing `:` (Windows drive
//! letters) parse unambiguously: `path\0line:text`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use bstr::ByteSlice;
use tracing::{debug, instrument, warn};

use super::{SearchError, SearchMatch, TextSearch};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct RipgrepSearch
{
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl RipgrepSearch
{
    pub fn new(
        binary: impl Into<PathBuf>,
        timeout: Option<Duration>,
    ) -> Self
    {
        Self { binary: binary.into(), timeout }
    }

    fn command(
        &self,
        pattern: &str,
        root: &Path,
    ) -> Command
    {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--line-number")
            .arg("--with-filename")
            .arg("--no-heading")
            .arg("--color")
            .arg("never")
            .arg("--null")
            .arg("--regexp")
            .arg(pattern)
            .arg("--")
            .arg(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl TextSearch for RipgrepSearch
{
    #[instrument(skip(self), fields(rg = %self.binary.display()))]
    fn search(
        &self,
        pattern: &str,
        root: &Path,
    ) -> Result<Vec<SearchMatch>, SearchError>
    {
        let child = match self
            .command(pattern, root)
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound =>
            {
                return Err(SearchError::ToolUnavailable(
                    self.binary
                        .display()
                        .to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let (status, stdout, stderr) = wait_with_output_timeout(child, self.timeout)?;

        // 0: matches, 1: no matches, anything else: error
        match status.code()
        {
            Some(0) =>
            {
                let matches = parse_output(&stdout);
                debug!(hits = matches.len(), "rg finished");
                Ok(matches)
            }
            Some(1) => Ok(Vec::new()),
            code =>
            {
                let stderr = stderr
                    .to_str_lossy()
                    .trim()
                    .to_owned();
                warn!(?code, %stderr, "rg failed");
                Err(SearchError::Failed { code: code.unwrap_or(-1), stderr })
            }
        }
    }

    fn name(&self) -> &'static str
    {
        "ripgrep"
    }
}

/// Wait for `child`, draining both pipes on helper threads so a chatty child
/// cannot block on a full pipe. Kills the child once `timeout` elapses.
fn wait_with_output_timeout(
    mut child: Child,
    timeout: Option<Duration>,
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), SearchError>
{
    let stdout = drain(
        child
            .stdout
            .take(),
    );
    let stderr = drain(
        child
            .stderr
            .take(),
    );

    let start = Instant::now();
    let status = loop
    {
        if let Some(status) = child.try_wait()?
        {
            break status;
        }

        if let Some(limit) = timeout
            && start.elapsed() > limit
        {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout.join();
            let _ = stderr.join();
            return Err(SearchError::Timeout(limit));
        }

        thread::sleep(POLL_INTERVAL);
    };

    let out = stdout
        .join()
        .unwrap_or_default();
    let err = stderr
        .join()
        .unwrap_or_default();
    Ok((status, out, err))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>>
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe
        {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Parse `path\0line:text` records; malformed lines are skipped.
///
/// `rg` searches files in parallel, so its file order varies between runs.
/// Hits are sorted by path, then line.
fn parse_output(stdout: &[u8]) -> Vec<SearchMatch>
{
    let mut hits: Vec<SearchMatch> = stdout
        .lines()
        .filter_map(|record| {
            let nul = memchr::memchr(0, record)?;
            let (path, rest) = (&record[..nul], &record[nul + 1..]);

            let colon = memchr::memchr(b':', rest)?;
            let line: u64 = rest[..colon]
                .to_str()
                .ok()?
                .parse()
                .ok()?;
            let text = rest[colon + 1..].to_str_lossy();

            Some(SearchMatch {
                path: PathBuf::from(
                    path.to_str_lossy()
                        .into_owned(),
                ),
                line,
                text: text
                    .trim_end_matches('\r')
                    .to_owned(),
            })
        })
        .collect();
    hits.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then(a.line.cmp(&b.line))
    });
    hits
}
