//! Deployment engine tests

use up2date::deploy::fsm::PackageStatus;
use up2date::deploy::gate::Signer;
use up2date::installer::InstallOutcome;
use up2date::models::deployment::{DeploymentResult, Execution, Finished};
use up2date::storage::settings::{SignatureSettings, SignatureVerificationLevel};

use crate::support::{
    request, DownloadBehavior, Harness, HarnessOptions, InstallBehavior, RecordingDownloader,
    RecordingInstaller,
};

const ALL_OUTCOMES: [InstallOutcome; 9] = [
    InstallOutcome::Success,
    InstallOutcome::RestartNeeded,
    InstallOutcome::PackageUnavailable,
    InstallOutcome::PackageNotSupported,
    InstallOutcome::SignatureVerificationFailed,
    InstallOutcome::ChocoNotInstalled,
    InstallOutcome::FailedToInstallChocoPackage,
    InstallOutcome::CannotStartInstaller,
    InstallOutcome::GeneralInstallationError,
];

fn assert_rejected(result: &DeploymentResult) {
    assert_eq!(result.execution(), Execution::Rejected);
    assert_eq!(result.finished(), Finished::Failure);
    assert!(!result.message().is_empty());
}

#[tokio::test]
async fn test_disallowed_extension_is_rejected_without_io() {
    let harness = Harness::with_outcome(InstallOutcome::Success).await;

    let result = harness.engine.decide(&request(1, "setup.exe", "forced", true)).await;
    assert_rejected(&result);
    assert_eq!(result.message(), "Package is not allowed - deployment rejected");

    let result = harness.engine.decide(&request(2, "README", "forced", true)).await;
    assert_rejected(&result);

    assert_eq!(harness.downloader.calls(), 0);
    assert_eq!(harness.installer.calls(), 0);
    assert!(harness.tracker().is_empty());
    harness.cleanup().await;
}

#[tokio::test]
async fn test_allowed_but_unsupported_extension_is_rejected() {
    use std::sync::Arc;
    use up2date::deploy::cancel::CancellationRegistry;
    use up2date::deploy::engine::DeploymentEngine;
    use up2date::deploy::gate::{NoSignatureVerifier, PackageGate};
    use up2date::deploy::tracker::PackageTracker;
    use up2date::installer::registry::InstallerRegistry;
    use up2date::storage::settings::PackageSettings;

    let downloader = Arc::new(RecordingDownloader::new(DownloadBehavior::Succeed));
    let packages = PackageSettings {
        allowed_extensions: vec![".msi".to_string(), ".exe".to_string()],
    };
    let registry = InstallerRegistry::new();
    let gate = PackageGate::new(
        &packages,
        &SignatureSettings::default(),
        &registry,
        Arc::new(NoSignatureVerifier),
    );
    let engine = DeploymentEngine::new(
        gate,
        registry,
        Arc::new(PackageTracker::new()),
        Arc::new(CancellationRegistry::default()),
        downloader.clone(),
        std::env::temp_dir().join("up2date-unsupported"),
    );

    let result = engine.decide(&request(1, "tool.exe", "forced", true)).await;
    assert_rejected(&result);
    assert!(result.message().contains("not supported"));
    assert_eq!(downloader.calls(), 0);
}

#[tokio::test]
async fn test_unknown_update_type_is_rejected() {
    let harness = Harness::with_outcome(InstallOutcome::Success).await;

    for update_type in ["sometimes", "Forced", ""] {
        let result = harness
            .engine
            .decide(&request(1, "app.msi", update_type, true))
            .await;
        assert_rejected(&result);
    }

    assert_eq!(harness.downloader.calls(), 0);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_cancel_before_decide() {
    let harness = Harness::with_outcome(InstallOutcome::Success).await;

    assert!(harness.engine.cancellations().request_cancel(7));
    let result = harness.engine.decide(&request(7, "app.msi", "forced", true)).await;

    assert_eq!(result.execution(), Execution::Canceled);
    assert_eq!(result.finished(), Finished::None);
    assert_eq!(harness.downloader.calls(), 0);
    assert_eq!(harness.installer.calls(), 0);

    // the cancel request is consumed by the deployment it preempted
    let result = harness.engine.decide(&request(7, "app.msi", "forced", true)).await;
    assert_eq!(result.execution(), Execution::Closed);
    assert_eq!(harness.installer.calls(), 1);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_rejection_takes_precedence_over_cancel() {
    let harness = Harness::with_outcome(InstallOutcome::Success).await;

    harness.engine.cancellations().request_cancel(3);
    let result = harness.engine.decide(&request(3, "setup.exe", "forced", true)).await;
    assert_rejected(&result);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_already_installed_short_circuits() {
    for outcome in [InstallOutcome::Success, InstallOutcome::RestartNeeded] {
        let harness = Harness::with_outcome(outcome).await;

        let first = harness.engine.decide(&request(1, "app.msi", "forced", true)).await;
        assert!(first.is_success());
        assert_eq!(harness.installer.calls(), 1);
        let status = harness.tracker().current_status("app.msi");
        assert!(status.is_installed());

        for update_type in ["skip", "attempt", "forced"] {
            let result = harness
                .engine
                .decide(&request(2, "APP.msi", update_type, false))
                .await;
            assert_eq!(result, DeploymentResult::closed_success("package already installed"));
        }

        assert_eq!(harness.downloader.calls(), 1);
        assert_eq!(harness.installer.calls(), 1);
        assert_eq!(harness.tracker().current_status("app.msi"), status);
        harness.cleanup().await;
    }
}

#[tokio::test]
async fn test_skip_in_window_downloads_only() {
    let harness = Harness::with_outcome(InstallOutcome::Success).await;

    let result = harness.engine.decide(&request(1, "app.msi", "skip", true)).await;
    assert_eq!(result.execution(), Execution::Closed);
    assert_eq!(result.finished(), Finished::Success);
    assert_eq!(harness.downloader.calls(), 1);
    assert_eq!(harness.installer.calls(), 0);
    assert_eq!(harness.tracker().current_status("app.msi"), PackageStatus::Downloaded);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_skip_out_of_window_defers() {
    let harness = Harness::with_outcome(InstallOutcome::Success).await;

    let result = harness.engine.decide(&request(1, "app.msi", "skip", false)).await;
    assert_eq!(result.execution(), Execution::Downloaded);
    assert_eq!(result.finished(), Finished::None);
    assert_eq!(harness.downloader.calls(), 1);
    assert_eq!(harness.installer.calls(), 0);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_attempt_suggests_regardless_of_window() {
    for in_window in [true, false] {
        let harness = Harness::with_outcome(InstallOutcome::Success).await;

        let result = harness
            .engine
            .decide(&request(1, "tool.1.0.nupkg", "attempt", in_window))
            .await;
        assert_eq!(result.execution(), Execution::Downloaded);
        assert_eq!(result.finished(), Finished::None);
        assert!(harness.tracker().is_suggested("tool.1.0.nupkg"));
        assert_eq!(
            harness.tracker().current_status("tool.1.0.nupkg"),
            PackageStatus::Downloaded
        );
        assert_eq!(harness.installer.calls(), 0);
        harness.cleanup().await;
    }
}

#[tokio::test]
async fn test_attempt_installs_after_acceptance() {
    let harness = Harness::with_outcome(InstallOutcome::Success).await;

    harness.engine.decide(&request(1, "app.msi", "attempt", false)).await;
    harness.tracker().accept_suggestion("app.msi").unwrap();

    let result = harness.engine.decide(&request(2, "app.msi", "attempt", false)).await;
    assert_eq!(result, DeploymentResult::closed_success(""));
    assert_eq!(harness.installer.installed(), vec!["app.msi".to_string()]);
    assert!(!harness.tracker().is_suggested("app.msi"));
    assert!(!harness.tracker().is_accepted("app.msi"));
    harness.cleanup().await;
}

#[tokio::test]
async fn test_attempt_after_failed_install_fails() {
    let harness = Harness::with_outcome(InstallOutcome::GeneralInstallationError).await;

    let forced = harness.engine.decide(&request(1, "app.msi", "forced", true)).await;
    assert_eq!(forced.finished(), Finished::Failure);
    assert_eq!(harness.tracker().current_status("app.msi"), PackageStatus::Failed);

    let result = harness.engine.decide(&request(2, "app.msi", "attempt", true)).await;
    assert_eq!(result.execution(), Execution::Closed);
    assert_eq!(result.finished(), Finished::Failure);
    assert_eq!(harness.installer.calls(), 1);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_repeated_attempt_after_failure_stays_failed() {
    let harness = Harness::with_outcome(InstallOutcome::GeneralInstallationError).await;

    harness.engine.decide(&request(1, "app.msi", "forced", true)).await;
    assert_eq!(harness.downloader.calls(), 1);

    for id in [2, 3] {
        let result = harness.engine.decide(&request(id, "app.msi", "attempt", true)).await;
        assert_eq!(result.execution(), Execution::Closed);
        assert_eq!(result.finished(), Finished::Failure);
        assert_eq!(harness.tracker().current_status("app.msi"), PackageStatus::Failed);
        assert!(!harness.tracker().is_suggested("app.msi"));
    }

    assert_eq!(harness.downloader.calls(), 1);
    assert_eq!(harness.installer.calls(), 1);

    // forced still retries a failed package
    harness.engine.decide(&request(4, "app.msi", "forced", true)).await;
    assert_eq!(harness.installer.calls(), 2);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_forced_installs_regardless_of_window() {
    for in_window in [true, false] {
        let harness = Harness::with_outcome(InstallOutcome::Success).await;

        let result = harness
            .engine
            .decide(&request(1, "app.msi", "forced", in_window))
            .await;
        assert_eq!(result.execution(), Execution::Closed);
        assert_eq!(result.finished(), Finished::Success);
        assert_eq!(harness.installer.calls(), 1);
        assert_eq!(harness.tracker().current_status("app.msi"), PackageStatus::Installed);

        let record = harness.tracker().record("app.msi").unwrap();
        assert!(record.digest.is_some());
        harness.cleanup().await;
    }
}

#[tokio::test]
async fn test_forced_restart_needed() {
    let harness = Harness::with_outcome(InstallOutcome::RestartNeeded).await;

    let result = harness.engine.decide(&request(1, "app.msi", "forced", true)).await;
    assert_eq!(result.execution(), Execution::Closed);
    assert_eq!(result.finished(), Finished::Success);
    assert_eq!(
        harness.tracker().current_status("app.msi"),
        PackageStatus::RestartNeeded
    );
    harness.cleanup().await;
}

#[tokio::test]
async fn test_failed_install_reports_clause() {
    let harness = Harness::with_outcome(InstallOutcome::ChocoNotInstalled).await;

    let result = harness.engine.decide(&request(1, "tool.nupkg", "forced", true)).await;
    assert_eq!(result.finished(), Finished::Failure);
    assert!(result.message().starts_with("Installation failed."));

    let record = harness.tracker().record("tool.nupkg").unwrap();
    assert_eq!(record.status, PackageStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("ChocoNotInstalled"));
    harness.cleanup().await;
}

#[tokio::test]
async fn test_installer_error_or_crash_is_general_error() {
    for behavior in [InstallBehavior::Fail, InstallBehavior::Panic] {
        let harness = Harness::new(HarnessOptions {
            installer: RecordingInstaller::with_behavior(behavior),
            ..Default::default()
        })
        .await;

        let result = harness.engine.decide(&request(1, "app.msi", "forced", true)).await;
        assert_eq!(result.execution(), Execution::Closed);
        assert_eq!(result.finished(), Finished::Failure);
        assert!(result.message().contains("General installation error"), "{:?}", result);
        assert_eq!(harness.installer.calls(), 1);

        let record = harness.tracker().record("app.msi").unwrap();
        assert_eq!(record.status, PackageStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("GeneralInstallationError"));
        harness.cleanup().await;
    }
}

#[tokio::test]
async fn test_installer_missing_at_install_time() {
    use std::sync::Arc;
    use up2date::deploy::cancel::CancellationRegistry;
    use up2date::deploy::engine::DeploymentEngine;
    use up2date::deploy::gate::{NoSignatureVerifier, PackageGate};
    use up2date::deploy::tracker::PackageTracker;
    use up2date::filesys::dir::Dir;
    use up2date::installer::registry::InstallerRegistry;
    use up2date::storage::settings::PackageSettings;

    let dir = Dir::create_temp_dir("engine").await.unwrap();
    let installer = Arc::new(RecordingInstaller::new(InstallOutcome::Success));
    let downloader = Arc::new(RecordingDownloader::new(DownloadBehavior::Succeed));

    // the gate admits .msi but the engine has nothing to run it with
    let gate = PackageGate::new(
        &PackageSettings::default(),
        &SignatureSettings::default(),
        &InstallerRegistry::new().register(installer.clone()),
        Arc::new(NoSignatureVerifier),
    );
    let engine = DeploymentEngine::new(
        gate,
        InstallerRegistry::new(),
        Arc::new(PackageTracker::new()),
        Arc::new(CancellationRegistry::default()),
        downloader.clone(),
        dir.path().join("packages"),
    );

    let result = engine.decide(&request(1, "app.msi", "forced", true)).await;
    assert_eq!(result.execution(), Execution::Closed);
    assert_eq!(result.finished(), Finished::Failure);
    assert!(result.message().contains("Package of this type is not supported"));
    assert_eq!(downloader.calls(), 1);
    assert_eq!(installer.calls(), 0);

    let record = engine.tracker().record("app.msi").unwrap();
    assert_eq!(record.status, PackageStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("PackageNotSupported"));
    let _ = dir.delete().await;
}

#[tokio::test]
async fn test_stale_download_does_not_reinstall_during_install() {
    let harness = Harness::new(HarnessOptions {
        downloader: RecordingDownloader::holding(1),
        installer: RecordingInstaller::held(InstallOutcome::Success),
        ..Default::default()
    })
    .await;

    let engine = harness.engine.clone();
    let first = tokio::spawn(async move { engine.decide(&request(1, "app.msi", "forced", true)).await });
    harness.wait_for_status("app.msi", PackageStatus::Downloading).await;

    let engine = harness.engine.clone();
    let second = tokio::spawn(async move { engine.decide(&request(2, "app.msi", "forced", true)).await });
    harness.wait_for_status("app.msi", PackageStatus::Installing).await;
    assert_eq!(harness.installer.calls(), 1);

    harness.downloader.release();
    let first = first.await.unwrap();
    assert_eq!(first.execution(), Execution::Closed);
    assert_eq!(first.finished(), Finished::Failure);
    assert!(first.message().contains("cannot complete download"), "{:?}", first);
    assert_eq!(harness.installer.calls(), 1);
    assert_eq!(harness.tracker().current_status("app.msi"), PackageStatus::Installing);

    harness.installer.release();
    let second = second.await.unwrap();
    assert_eq!(second, DeploymentResult::closed_success(""));
    assert_eq!(harness.installer.calls(), 1);
    assert_eq!(harness.tracker().current_status("app.msi"), PackageStatus::Installed);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_stale_download_after_install_reports_installed() {
    let harness = Harness::new(HarnessOptions {
        downloader: RecordingDownloader::holding(1),
        ..Default::default()
    })
    .await;

    let engine = harness.engine.clone();
    let first = tokio::spawn(async move { engine.decide(&request(1, "app.msi", "forced", true)).await });
    harness.wait_for_status("app.msi", PackageStatus::Downloading).await;

    let second = harness.engine.decide(&request(2, "app.msi", "forced", true)).await;
    assert!(second.is_success());
    assert_eq!(harness.tracker().current_status("app.msi"), PackageStatus::Installed);

    harness.downloader.release();
    let first = first.await.unwrap();
    assert_eq!(first, DeploymentResult::closed_success("package already installed"));
    assert_eq!(harness.installer.calls(), 1);
    assert_eq!(harness.tracker().current_status("app.msi"), PackageStatus::Installed);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_signature_failure_names_level() {
    let harness = Harness::new(HarnessOptions {
        signature: SignatureSettings {
            check_signature: true,
            level: SignatureVerificationLevel::SignedByTrustedCertificate,
            whitelist: vec![],
        },
        signer: Some(Signer {
            subject: "CN=Unknown".to_string(),
            thumbprint: "0011".to_string(),
            trusted: false,
        }),
        ..Default::default()
    })
    .await;

    let result = harness.engine.decide(&request(1, "app.msi", "forced", true)).await;
    assert_eq!(result.execution(), Execution::Closed);
    assert_eq!(result.finished(), Finished::Failure);
    assert!(result.message().contains("SignedByTrustedCertificate"));
    assert_eq!(harness.installer.calls(), 0);
    assert_eq!(harness.tracker().current_status("app.msi"), PackageStatus::Failed);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_whitelisted_signer_installs() {
    let harness = Harness::new(HarnessOptions {
        signature: SignatureSettings {
            check_signature: true,
            level: SignatureVerificationLevel::SignedByWhitelistedCertificate,
            whitelist: vec!["00:11".to_string()],
        },
        signer: Some(Signer {
            subject: "CN=Vendor".to_string(),
            thumbprint: "0011".to_string(),
            trusted: false,
        }),
        ..Default::default()
    })
    .await;

    let result = harness.engine.decide(&request(1, "app.msi", "forced", true)).await;
    assert!(result.is_success());
    assert_eq!(harness.installer.calls(), 1);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_download_failure_leaves_downloading() {
    for download in [DownloadBehavior::Fail, DownloadBehavior::Panic] {
        let harness = Harness::new(HarnessOptions {
            downloader: RecordingDownloader::new(download),
            ..Default::default()
        })
        .await;

        let result = harness.engine.decide(&request(1, "app.msi", "forced", true)).await;
        assert_eq!(result.execution(), Execution::Closed);
        assert_eq!(result.finished(), Finished::Failure);
        assert_eq!(
            harness.tracker().current_status("app.msi"),
            PackageStatus::Downloading
        );
        assert_eq!(harness.installer.calls(), 0);
        harness.cleanup().await;
    }
}

#[tokio::test]
async fn test_every_result_satisfies_invariants() {
    let files = ["app.msi", "setup.exe", "tool.nupkg"];
    let update_types = ["skip", "attempt", "forced", "bogus"];

    for outcome in ALL_OUTCOMES {
        let harness = Harness::with_outcome(outcome).await;
        let mut id = 0;
        for file in files {
            for update_type in update_types {
                for in_window in [true, false] {
                    id += 1;
                    if id % 5 == 0 {
                        harness.engine.cancellations().request_cancel(id);
                    }
                    let result = harness
                        .engine
                        .decide(&request(id, file, update_type, in_window))
                        .await;
                    assert!(result.satisfies_invariants(), "{:?}", result);
                    if result.is_success() {
                        assert_eq!(result.execution(), Execution::Closed);
                    }
                    if result.execution() == Execution::Rejected {
                        assert_eq!(result.finished(), Finished::Failure);
                    }
                }
            }
        }
        harness.cleanup().await;
    }
}
