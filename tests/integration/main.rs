//! Integration tests for fnplane

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command with an isolated config file
    fn fnplane(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("fnplane");
        cmd.env("FNPLANE_CONFIG", config_dir.path().join("config.toml"))
            .env_remove("RUST_LOG")
            .env_remove("FNPLANE_BUILDER_URL");
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        fnplane(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("builder"))
            .stdout(predicate::str::contains("build"));
    }

    #[test]
    fn version_flag_displays() {
        let dir = TempDir::new().unwrap();
        fnplane(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("fnplane"));
    }

    #[test]
    fn version_json() {
        let dir = TempDir::new().unwrap();
        let output = fnplane(&dir)
            .args(["version", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let info: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(info["name"], "fnplane");
        assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        fnplane(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        fnplane(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[builder]"))
            .stdout(predicate::str::contains("port = 8000"));
    }

    #[test]
    fn config_set_then_show() {
        let dir = TempDir::new().unwrap();
        fnplane(&dir)
            .args(["config", "set", "builder.port", "9100"])
            .assert()
            .success();

        fnplane(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 9100"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let dir = TempDir::new().unwrap();
        fnplane(&dir)
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[general]\nlog_format = \"yaml\"\n",
        )
        .unwrap();

        fnplane(&dir)
            .args(["version"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("fnplane config init --force"));
    }

    #[test]
    fn builder_requires_shared_volume() {
        let dir = TempDir::new().unwrap();
        fnplane(&dir)
            .arg("builder")
            .assert()
            .failure()
            .stderr(predicate::str::contains("SHARED_VOLUME"));
    }

    #[test]
    fn build_against_unreachable_builder_fails() {
        let dir = TempDir::new().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        fnplane(&dir)
            .args(["build", "pkg", "--url", &format!("http://{}", addr)])
            .assert()
            .failure()
            .stderr(predicate::str::contains("HTTP request to builder failed"));
    }
}
