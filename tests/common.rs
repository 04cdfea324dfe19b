use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

// Not every test binary uses every helper
#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
    pub release_path: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yaml");
        let release_path = temp_dir.path().join("releases");

        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_binward"));

        Self {
            temp_dir,
            config_path,
            release_path,
            bin_path,
        }
    }

    /// Write `releases:` YAML into a config rooted at this context's release path.
    pub fn write_config(&self, releases: &str) {
        let content = format!(
            "config:\n  releasepath: {}\nreleases:\n{}",
            self.release_path.display(),
            releases
        );
        std::fs::write(&self.config_path, content).expect("Failed to write config");
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.env("BINWARD_CONFIG", &self.config_path);
        cmd.env_remove("BINWARD_RELEASE_PATH");
        cmd.env_remove("RUST_LOG");
        // Isolate from the user's real config and home
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("XDG_CONFIG_HOME", self.temp_dir.path().join("config"));
        cmd.env("XDG_DATA_HOME", self.temp_dir.path().join("data"));
        cmd
    }
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert!(
            !self.status.success(),
            "Command unexpectedly succeeded\nstdout: {}\nstderr: {}",
            self.stdout,
            self.stderr
        );
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
