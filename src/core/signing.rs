//! Response-signing worker interface (spec 4.9, 6): the core never links an
//! OpenPGP library. It shells out to an external `pgp_engine` binary through
//! the same duplex-pipe child-supervisor path as CGI (`core::cgi`), and only
//! knows the wire contract: the worker is handed a `sign <path>` argument
//! plus a `GATEKEEPD_SIGN_BOUNDARY` env var, and must write a complete HTTP
//! response -- `Content-Type: multipart/msigned; boundary=<that boundary>`,
//! a signed-or-original body -- to its stdout, CGI-header style.

use crate::core::glob::glob_match;
use std::process::Command;

/// Charset `[G-Vg-v]` (spec 6): chosen upstream so a generated boundary can
/// never collide with a base64-encoded multipart part.
const BOUNDARY_CHARSET: &[u8] = b"GHIJKLMNOPQRSTUVghijklmnopqrstuv";
const BOUNDARY_LEN: usize = 9;

/// Small xorshift64 seeded from the address of a fresh stack value and the
/// process id -- enough entropy for a boundary token, without pulling in a
/// `rand` dependency the rest of this stack never reaches for.
fn next_seed() -> u64 {
    let marker = 0u8;
    let addr = &marker as *const u8 as u64;
    let pid = std::process::id() as u64;
    let mut x = addr ^ (pid.wrapping_mul(0x9E3779B97F4A7C15));
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}

/// Generates a fresh 9-character multipart boundary from `[G-Vg-v]`.
pub fn boundary() -> String {
    let mut seed = next_seed();
    let mut s = String::with_capacity(BOUNDARY_LEN);
    for _ in 0..BOUNDARY_LEN {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let idx = (seed as usize) % BOUNDARY_CHARSET.len();
        s.push(BOUNDARY_CHARSET[idx] as char);
    }
    s
}

/// True when `url` should be signed: a `pgp_engine` is configured and the
/// path does not match `sign_exclude` (spec 1 "signing-exclusion pattern").
pub fn should_sign(pgp_engine: &Option<String>, sign_exclude: &Option<String>, url: &str) -> bool {
    if pgp_engine.is_none() {
        return false;
    }
    match sign_exclude {
        Some(pattern) => !glob_match(pattern, url),
        None => true,
    }
}

/// Builds the `{pgp_engine} sign <path>` command; the generated boundary is
/// passed through the environment so the worker's stdout can declare it.
pub fn sign_command(pgp_engine: &str, file_path: &std::path::Path, boundary: &str) -> Command {
    let mut cmd = Command::new(pgp_engine);
    cmd.arg("sign").arg(file_path).env("GATEKEEPD_SIGN_BOUNDARY", boundary);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_length_and_charset() {
        let b = boundary();
        assert_eq!(b.len(), BOUNDARY_LEN);
        assert!(b.bytes().all(|c| BOUNDARY_CHARSET.contains(&c)));
    }

    #[test]
    fn test_boundary_varies() {
        // Not a statistical test, just a sanity check the generator isn't
        // a constant; collisions across a handful of calls would be a bug.
        let samples: Vec<String> = (0..5).map(|_| boundary()).collect();
        assert!(samples.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_should_sign_requires_engine() {
        assert!(!should_sign(&None, &None, "/file.txt"));
    }

    #[test]
    fn test_should_sign_no_exclude() {
        let engine = Some("gpg-worker".to_string());
        assert!(should_sign(&engine, &None, "/file.txt"));
    }

    #[test]
    fn test_should_sign_respects_exclude_pattern() {
        let engine = Some("gpg-worker".to_string());
        let exclude = Some("/static/*".to_string());
        assert!(!should_sign(&engine, &exclude, "/static/logo.png"));
        assert!(should_sign(&engine, &exclude, "/reports/q1.pdf"));
    }

    #[test]
    fn test_sign_command_sets_argv_and_env() {
        let cmd = sign_command("gpg-worker", std::path::Path::new("/tmp/file.txt"), "ABCDEFGHI");
        assert_eq!(cmd.get_program(), "gpg-worker");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["sign", "/tmp/file.txt"]);
        let found = cmd.get_envs().any(|(k, v)| {
            k == "GATEKEEPD_SIGN_BOUNDARY" && v == Some(std::ffi::OsStr::new("ABCDEFGHI"))
        });
        assert!(found);
    }
}
