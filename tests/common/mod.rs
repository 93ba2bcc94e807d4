//! Shared helpers for the integration suites.
//!
//! Testcases are shell scripts. The fake compiler wraps a script into an
//! executable reference binary and the fake candidate runs the script with
//! `sh`, so a well-behaved candidate reproduces the reference output exactly.

#![allow(dead_code)]

use judgebench::HarnessConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-friendly subscriber once per test binary.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// `cc [lib] src -o out`: fails on a missing source or `BUILD_FAIL`, otherwise emits `#!/bin/sh` + src.
const FAKE_CC: &str = r#"out=""; src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) src="$1"; shift ;;
  esac
done
if [ ! -f "$src" ]; then echo "error: $src: no such file" >&2; exit 1; fi
if grep -q BUILD_FAIL "$src"; then echo "error: forced failure in $src" >&2; exit 1; fi
{ echo '#!/bin/sh'; cat "$src"; } > "$out"
chmod +x "$out"
"#;

/// Runs the script it is given, except that it crashes on `CRASH` and spins
/// after printing `partial` on `HANG`.
const FAKE_CANDIDATE: &str = r#"if grep -q CRASH "$1"; then kill -SEGV $$; fi
if grep -q HANG "$1"; then printf partial; while :; do :; done; fi
exec sh "$1"
"#;

/// A scratch testcase directory.
pub struct Corpus {
    dir: TempDir,
}

impl Corpus {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("fake_cc.sh"), FAKE_CC).expect("write fake cc");
        fs::write(dir.path().join("candidate.sh"), FAKE_CANDIDATE).expect("write candidate");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes `test<NN>.c`.
    pub fn case(&self, id: u32, script: &str) -> &Self {
        fs::write(self.file(&format!("test{id:02}.c")), script).expect("write testcase");
        self
    }

    /// Writes a shipped `std<NN>.txt`.
    pub fn expected(&self, id: u32, output: &str) -> &Self {
        fs::write(self.file(&format!("std{id:02}.txt")), output).expect("write oracle");
        self
    }

    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.file(name)).ok()
    }

    /// Compile-oracle configuration over `0..=max_id` using the fakes.
    pub fn config(&self, max_id: u32) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.testcase_dir = self.path().to_path_buf();
        config.max_id = max_id;
        config.jobs = 2;
        config.reference.compiler = "sh".to_string();
        config.reference.flags = vec![self.file("fake_cc.sh").display().to_string()];
        config.reference.support_library = None;
        config.reference.run_timeout_ms = 5_000;
        config.candidate.binary = PathBuf::from("sh");
        config.candidate.args = vec![self.file("candidate.sh").display().to_string()];
        config.candidate.timeout_ms = 500;
        config
    }

    /// TOML equivalent of [`Corpus::config`], written to `judge.toml`.
    pub fn write_judge_toml(&self, max_id: u32) {
        let text = format!(
            r#"max_id = {max_id}
jobs = 2

[reference]
compiler = "sh"
flags = ["{cc}"]
support_library = ""
run_timeout_ms = 5000

[candidate]
binary = "sh"
args = ["{candidate}"]
timeout_ms = 500
"#,
            cc = self.file("fake_cc.sh").display(),
            candidate = self.file("candidate.sh").display(),
        );
        fs::write(self.file("judge.toml"), text).expect("write judge.toml");
    }
}
