//! Package tracker tests

use std::sync::Arc;

use up2date::deploy::fsm::PackageStatus;
use up2date::deploy::tracker::PackageTracker;
use up2date::errors::AgentError;
use up2date::installer::InstallOutcome;

fn install(tracker: &PackageTracker, name: &str, outcome: InstallOutcome) {
    tracker.mark_download_started(name).unwrap();
    tracker.mark_download_finished(name).unwrap();
    tracker.mark_install_started(name).unwrap();
    tracker.mark_install_outcome(name, outcome).unwrap();
}

#[test]
fn test_unknown_package() {
    let tracker = PackageTracker::new();
    assert_eq!(tracker.current_status("nothing.msi"), PackageStatus::Unknown);
    assert!(!tracker.is_already_installed("nothing.msi"));
    assert!(tracker.record("nothing.msi").is_none());
}

#[test]
fn test_identity_is_case_insensitive() {
    let tracker = PackageTracker::new();
    install(&tracker, "App.MSI", InstallOutcome::Success);

    assert!(tracker.is_already_installed("app.msi"));
    assert!(tracker.is_already_installed("APP.msi"));
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_invalid_transition_is_reported() {
    let tracker = PackageTracker::new();
    let err = tokio_test::assert_err!(tracker.mark_install_started("app.msi"));
    assert!(matches!(err, AgentError::InvalidTransition(_)));
}

#[test]
fn test_accept_requires_suggestion() {
    let tracker = PackageTracker::new();
    assert!(matches!(
        tracker.accept_suggestion("app.msi"),
        Err(AgentError::NotFound(_))
    ));

    tracker.mark_download_started("app.msi").unwrap();
    assert!(matches!(
        tracker.accept_suggestion("app.msi"),
        Err(AgentError::ValidationError(_))
    ));

    tracker.mark_suggested("app.msi");
    tokio_test::assert_ok!(tracker.accept_suggestion("app.msi"));
    assert!(tracker.is_accepted("app.msi"));
}

#[test]
fn test_restore_resolves_interrupted_operations() {
    let tracker = PackageTracker::new();
    install(&tracker, "done.msi", InstallOutcome::RestartNeeded);
    tracker.mark_download_started("fetching.msi").unwrap();
    tracker.mark_download_started("busy.msi").unwrap();
    tracker.mark_download_finished("busy.msi").unwrap();
    tracker.mark_install_started("busy.msi").unwrap();
    tracker.mark_download_started("offered.nupkg").unwrap();
    tracker.mark_download_finished("offered.nupkg").unwrap();
    tracker.mark_suggested("offered.nupkg");

    let json = serde_json::to_string(&tracker.records()).unwrap();
    let restored = PackageTracker::new();
    restored.restore(serde_json::from_str(&json).unwrap());

    assert_eq!(restored.len(), 4);
    assert_eq!(restored.current_status("done.msi"), PackageStatus::RestartNeeded);
    assert_eq!(restored.current_status("fetching.msi"), PackageStatus::Unavailable);
    assert!(restored.is_suggested("offered.nupkg"));

    let busy = restored.record("busy.msi").unwrap();
    assert_eq!(busy.status, PackageStatus::Failed);
    assert_eq!(busy.error.as_deref(), Some("Installation interrupted"));
}

#[test]
fn test_reset_forgets_lifecycle() {
    let tracker = PackageTracker::new();
    install(&tracker, "app.msi", InstallOutcome::Success);

    assert_eq!(tracker.reset("app.msi").unwrap(), PackageStatus::Unavailable);
    assert!(!tracker.is_already_installed("app.msi"));
    assert_eq!(tracker.mark_available("app.msi").unwrap(), PackageStatus::Available);
}

#[test]
fn test_concurrent_packages() {
    let tracker = Arc::new(PackageTracker::new());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let tracker = tracker.clone();
            std::thread::spawn(move || {
                let name = format!("package-{}.msi", i);
                for _ in 0..50 {
                    install(&tracker, &name, InstallOutcome::GeneralInstallationError);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(tracker.len(), 8);
    assert!(tracker
        .records()
        .iter()
        .all(|r| r.status == PackageStatus::Failed));
}
