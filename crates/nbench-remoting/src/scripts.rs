//! PowerShell snippets run on the remote host.
//!
//! Every path is embedded as a single-quoted literal and resolved against the
//! remote session's current location before use.

use crate::error::{RemotingError, RemotingResult};
use crate::types::DestinationStatus;

/// Quote `s` as a PowerShell single-quoted string literal.
pub fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn resolve(path: &str) -> String {
    format!(
        "$p = $ExecutionContext.SessionState.Path.GetUnresolvedProviderPathFromPSPath({})",
        ps_quote(path)
    )
}

/// Run `body` with terminating errors mapped to a non-zero exit code.
fn guarded(body: &str) -> String {
    format!(
        "$ErrorActionPreference = 'Stop'; $ProgressPreference = 'SilentlyContinue'; \
         try {{ {} }} catch {{ [Console]::Error.WriteLine($_.Exception.Message); exit 1 }}",
        body
    )
}

pub fn exists(path: &str) -> String {
    guarded(&format!(
        "{}; if (Test-Path -LiteralPath $p -PathType Leaf) {{ 'True' }} else {{ 'False' }}",
        resolve(path)
    ))
}

pub fn make_dirs(dir: &str) -> String {
    guarded(&format!(
        "{}; if (-not (Test-Path -LiteralPath $p)) {{ New-Item -ItemType Directory -Path $p -Force | Out-Null }}",
        resolve(dir)
    ))
}

pub fn delete_file(path: &str) -> String {
    guarded(&format!(
        "{}; if (Test-Path -LiteralPath $p) {{ Remove-Item -LiteralPath $p -Force }}",
        resolve(path)
    ))
}

/// Existence check, delete-or-skip and parent creation in a single command.
///
/// Prints `exists`, `replaced` or `absent`.
pub fn prepare_destination(path: &str, skip_if_exists: bool) -> String {
    let skip = if skip_if_exists { "$true" } else { "$false" };
    guarded(&format!(
        "{resolve}; \
         if (Test-Path -LiteralPath $p -PathType Leaf) {{ \
           if ({skip}) {{ 'exists' }} else {{ Remove-Item -LiteralPath $p -Force; 'replaced' }} \
         }} else {{ \
           $d = Split-Path -Parent $p; \
           if ($d -and -not (Test-Path -LiteralPath $d)) {{ New-Item -ItemType Directory -Path $d -Force | Out-Null }}; \
           'absent' \
         }}",
        resolve = resolve(path),
        skip = skip,
    ))
}

/// Append the base64 text arriving on stdin to `path`.
pub fn append_from_stdin(path: &str) -> String {
    guarded(&format!(
        "{}; \
         $bytes = [System.Convert]::FromBase64String([Console]::In.ReadToEnd().Trim()); \
         $fs = [System.IO.File]::Open($p, [System.IO.FileMode]::OpenOrCreate, [System.IO.FileAccess]::Write); \
         try {{ [void]$fs.Seek(0, [System.IO.SeekOrigin]::End); $fs.Write($bytes, 0, $bytes.Length) }} \
         finally {{ $fs.Close() }}; \
         $bytes.Length",
        resolve(path)
    ))
}

pub fn file_size(path: &str) -> String {
    guarded(&format!("{}; (Get-Item -LiteralPath $p).Length", resolve(path)))
}

pub fn parse_destination_status(stdout: &str) -> RemotingResult<DestinationStatus> {
    match last_line(stdout) {
        "exists" => Ok(DestinationStatus::Existing),
        "replaced" => Ok(DestinationStatus::Replaced),
        "absent" => Ok(DestinationStatus::Absent),
        other => Err(RemotingError::parse(format!(
            "Unexpected pre-check output: '{}'",
            other
        ))),
    }
}

pub fn parse_bool(stdout: &str) -> RemotingResult<bool> {
    match last_line(stdout) {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(RemotingError::parse(format!(
            "Expected True/False, got '{}'",
            other
        ))),
    }
}

pub fn parse_u64(stdout: &str) -> RemotingResult<u64> {
    let line = last_line(stdout);
    line.parse::<u64>()
        .map_err(|_| RemotingError::parse(format!("Expected a byte count, got '{}'", line)))
}

fn last_line(stdout: &str) -> &str {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(ps_quote("C:/o'neil/x.bin"), "'C:/o''neil/x.bin'");
    }

    #[test]
    fn prepare_embeds_skip_flag() {
        assert!(prepare_destination("a.bin", true).contains("if ($true)"));
        assert!(prepare_destination("a.bin", false).contains("if ($false)"));
        assert!(prepare_destination("dir/a.bin", false).contains("'dir/a.bin'"));
    }

    #[test]
    fn append_resolves_and_appends() {
        let s = append_from_stdin("payload/iperf.zip");
        assert!(s.contains("GetUnresolvedProviderPathFromPSPath('payload/iperf.zip')"));
        assert!(s.contains("OpenOrCreate"));
        assert!(s.contains("SeekOrigin]::End"));
        assert!(s.contains("exit 1"));
    }

    #[test]
    fn destination_status_from_output() {
        assert_eq!(
            parse_destination_status("absent\r\n").unwrap(),
            DestinationStatus::Absent
        );
        assert_eq!(
            parse_destination_status("exists").unwrap(),
            DestinationStatus::Existing
        );
        assert_eq!(
            parse_destination_status("replaced\n").unwrap(),
            DestinationStatus::Replaced
        );
        assert!(parse_destination_status("").is_err());
    }

    #[test]
    fn scalar_parsers() {
        assert!(parse_bool("True\r\n").unwrap());
        assert!(!parse_bool("False").unwrap());
        assert_eq!(parse_u64(" 2621440 \r\n").unwrap(), 2_621_440);
        assert!(parse_u64("n/a").is_err());
    }
}
