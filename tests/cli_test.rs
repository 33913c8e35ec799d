//! Binary startup tests

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;

    #[test]
    fn test_exits_without_bucket_name() {
        let dir = tempfile::tempdir().unwrap();

        Command::cargo_bin("gcs-file-api")
            .unwrap()
            .current_dir(dir.path())
            .env_remove("GCP_BUCKET_NAME")
            .env("PORT", "0")
            .timeout(std::time::Duration::from_secs(30))
            .assert()
            .failure()
            .stderr(predicate::str::contains("GCP_BUCKET_NAME"));
    }

    #[test]
    fn test_malformed_env_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "not a valid line\nGCP_BUCKET_NAME=uploads\n")
            .unwrap();

        Command::cargo_bin("gcs-file-api")
            .unwrap()
            .current_dir(dir.path())
            .env_remove("GCP_BUCKET_NAME")
            .env_remove("RUST_LOG")
            .env("PORT", "0")
            .timeout(std::time::Duration::from_secs(30))
            .assert()
            .failure()
            .stdout(predicate::str::contains("Failed to load environment"))
            .stderr(predicate::str::contains("GCP_BUCKET_NAME"));
    }

    #[test]
    fn test_help_lists_options() {
        Command::cargo_bin("gcs-file-api")
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--log-format"))
            .stdout(predicate::str::contains("--env-file"));
    }
}
