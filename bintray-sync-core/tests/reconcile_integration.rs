use bintray_sync_core::context::RunContext;
use bintray_sync_core::contract::{
    MockPackageService, PackageConfig, RepositoryConfig, UploadParams,
};
use bintray_sync_core::manifest::{Manifest, Repository};
use bintray_sync_core::reconcile::{reconcile, Action, ReconcileError};
use mockall::Sequence;

fn upload() -> UploadParams {
    UploadParams {
        version: "1.0.0".to_string(),
        pattern: "dist/*.deb".to_string(),
        target_path: String::new(),
        flat: true,
        recursive: true,
        publish: false,
        override_existing: false,
        explode: false,
        deb: None,
    }
}

fn debian_repo(name: &str) -> Repository {
    Repository::new(
        "acme",
        name,
        RepositoryConfig {
            repo_type: "debian".to_string(),
            ..RepositoryConfig::default()
        },
    )
}

fn package_config(desc: &str) -> PackageConfig {
    PackageConfig {
        desc: Some(desc.to_string()),
        ..PackageConfig::default()
    }
}

#[tokio::test]
async fn test_absent_repo_and_package_are_created_in_order() {
    let manifest = Manifest::new(vec![
        debian_repo("r1").with_package("p1", package_config("first"), upload())
    ])
    .unwrap();

    let mut service = MockPackageService::new();
    let mut seq = Sequence::new();

    service
        .expect_repository_exists()
        .withf(|path| path.to_string() == "acme/r1")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(false));
    service
        .expect_create_repository()
        .withf(|path, config| path.repo == "r1" && config.repo_type == "debian")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(true));
    service
        .expect_package_exists()
        .withf(|path| path.to_string() == "acme/r1/p1")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(false));
    service
        .expect_create_package()
        .withf(|path, config| path.package == "p1" && config.desc.as_deref() == Some("first"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    let report = reconcile(&RunContext::new(), &manifest, &service)
        .await
        .expect("reconcile should succeed");

    assert_eq!(report.repositories.len(), 1);
    assert_eq!(report.repositories[0].action, Action::Created);
    assert_eq!(report.repositories[0].packages[0].action, Action::Created);
    assert_eq!(report.created_count(), 2);
}

#[tokio::test]
async fn test_existing_repo_and_package_is_a_no_op() {
    let manifest = Manifest::new(vec![
        debian_repo("r2").with_package("p2", PackageConfig::default(), upload())
    ])
    .unwrap();

    let mut service = MockPackageService::new();
    service
        .expect_repository_exists()
        .times(1)
        .returning(|_| Ok(true));
    service.expect_package_exists().times(1).returning(|_| Ok(true));
    service.expect_create_repository().never();
    service.expect_create_package().never();

    let report = reconcile(&RunContext::new(), &manifest, &service)
        .await
        .expect("reconcile should succeed");

    assert_eq!(report.repositories[0].action, Action::AlreadyExists);
    assert_eq!(
        report.repositories[0].packages[0].action,
        Action::AlreadyExists
    );
    assert_eq!(report.created_count(), 0);
}

#[tokio::test]
async fn test_repository_creation_failure_aborts_everything_after_it() {
    let manifest = Manifest::new(vec![
        debian_repo("r1")
            .with_package("p1", PackageConfig::default(), upload())
            .with_package("p2", PackageConfig::default(), upload()),
        debian_repo("later").with_package("p3", PackageConfig::default(), upload()),
    ])
    .unwrap();

    let mut service = MockPackageService::new();
    service
        .expect_repository_exists()
        .withf(|path| path.repo == "r1")
        .times(1)
        .returning(|_| Ok(false));
    service
        .expect_create_repository()
        .times(1)
        .returning(|_, _| Err("403 forbidden".into()));
    service.expect_package_exists().never();
    service.expect_create_package().never();

    let err = reconcile(&RunContext::new(), &manifest, &service)
        .await
        .expect_err("creation failure must be fatal");

    match err {
        ReconcileError::CreateRepository { repository, source } => {
            assert_eq!(repository.to_string(), "acme/r1");
            assert!(source.to_string().contains("403"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_package_creation_failure_stops_remaining_packages() {
    let manifest = Manifest::new(vec![debian_repo("r1")
        .with_package("p1", PackageConfig::default(), upload())
        .with_package("p2", PackageConfig::default(), upload())])
    .unwrap();

    let mut service = MockPackageService::new();
    service
        .expect_repository_exists()
        .returning(|_| Ok(true));
    service
        .expect_package_exists()
        .withf(|path| path.package == "p1")
        .times(1)
        .returning(|_| Ok(false));
    service
        .expect_create_package()
        .times(1)
        .returning(|_, _| Err("boom".into()));

    let err = reconcile(&RunContext::new(), &manifest, &service)
        .await
        .expect_err("package creation failure must be fatal");

    assert!(matches!(err, ReconcileError::CreatePackage { ref package, .. } if package.package == "p1"));
    assert!(err.to_string().contains("acme/r1/p1"));
}

#[tokio::test]
async fn test_existence_check_error_falls_through_to_creation() {
    let manifest = Manifest::new(vec![
        debian_repo("r1").with_package("p1", PackageConfig::default(), upload())
    ])
    .unwrap();

    let mut service = MockPackageService::new();
    service
        .expect_repository_exists()
        .times(1)
        .returning(|_| Err("connection reset".into()));
    service
        .expect_create_repository()
        .times(1)
        .returning(|_, _| Ok(true));
    service
        .expect_package_exists()
        .times(1)
        .returning(|_| Err("timeout".into()));
    service
        .expect_create_package()
        .times(1)
        .returning(|_, _| Ok(()));

    let report = reconcile(&RunContext::new(), &manifest, &service)
        .await
        .expect("existence check errors are not fatal");
    assert_eq!(report.created_count(), 2);
}

#[tokio::test]
async fn test_repository_reported_present_on_create_still_reconciles_packages() {
    let manifest = Manifest::new(vec![
        debian_repo("r1").with_package("p1", PackageConfig::default(), upload())
    ])
    .unwrap();

    let mut service = MockPackageService::new();
    service
        .expect_repository_exists()
        .returning(|_| Ok(false));
    service
        .expect_create_repository()
        .times(1)
        .returning(|_, _| Ok(false));
    service
        .expect_package_exists()
        .times(1)
        .returning(|_| Ok(true));
    service.expect_create_package().never();

    let report = reconcile(&RunContext::new(), &manifest, &service)
        .await
        .unwrap();
    assert_eq!(report.repositories[0].action, Action::AlreadyExists);
}

#[tokio::test]
async fn test_every_entity_is_visited_once_in_manifest_order() {
    let manifest = Manifest::new(vec![
        debian_repo("a")
            .with_package("a1", PackageConfig::default(), upload())
            .with_package("a2", PackageConfig::default(), upload()),
        debian_repo("b").with_package("b1", PackageConfig::default(), upload()),
    ])
    .unwrap();

    let mut service = MockPackageService::new();
    let mut seq = Sequence::new();

    for (repo, packages) in [("a", vec!["a1", "a2"]), ("b", vec!["b1"])] {
        service
            .expect_repository_exists()
            .withf(move |path| path.repo == repo)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));
        for package in packages {
            service
                .expect_package_exists()
                .withf(move |path| path.repo == repo && path.package == package)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(true));
        }
    }

    let report = reconcile(&RunContext::new(), &manifest, &service)
        .await
        .unwrap();

    let visited: Vec<String> = report
        .repositories
        .iter()
        .flat_map(|r| r.packages.iter().map(|p| p.package.to_string()))
        .collect();
    assert_eq!(visited, vec!["acme/a/a1", "acme/a/a2", "acme/b/b1"]);
}

#[tokio::test]
async fn test_empty_manifest_makes_no_calls() {
    let service = MockPackageService::new();
    let report = reconcile(&RunContext::new(), &Manifest::default(), &service)
        .await
        .unwrap();
    assert!(report.repositories.is_empty());
}
