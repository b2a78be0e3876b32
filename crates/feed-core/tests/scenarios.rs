//! End-to-end scenarios and invariant properties exercised against the
//! repository engine through its public API only, mirroring the way the
//! teacher's crate keeps its heavier integration coverage in `tests/`
//! alongside the `#[cfg(test)]` unit modules in `src/`.

use std::io::Write as _;

use feed_core::{
    Compatibility, Error, LocalFileSystem, MemoryFileSystem, PackageArchive, Repository,
    RepositoryOptions,
};
use tokio_util::sync::CancellationToken;

fn build_nupkg(id: &str, version: &str, dependency_version: Option<&str>) -> Vec<u8> {
    let deps = match dependency_version {
        Some(v) => format!(
            "<dependencies><dependency id=\"Other.Package\" version=\"{v}\" /></dependencies>"
        ),
        None => String::new(),
    };
    let nuspec = format!(
        "<?xml version=\"1.0\"?><package><metadata><id>{id}</id><version>{version}</version>{deps}</metadata></package>"
    );
    let mut buf = Vec::new();
    let cursor = std::io::Cursor::new(&mut buf);
    let mut writer = zip::ZipWriter::new(cursor);
    let options = zip::write::FileOptions::default();
    writer.start_file("pkg.nuspec", options).unwrap();
    writer.write_all(nuspec.as_bytes()).unwrap();
    writer.finish().unwrap();
    buf
}

fn test_archive(id: &str, version: &str) -> PackageArchive {
    PackageArchive::from_bytes(build_nupkg(id, version, None)).unwrap()
}

fn test_archive_with_dependency(id: &str, version: &str, dependency_version: &str) -> PackageArchive {
    PackageArchive::from_bytes(build_nupkg(id, version, Some(dependency_version))).unwrap()
}

fn memory_repo(options_mut: impl FnOnce(&mut RepositoryOptions)) -> Repository<MemoryFileSystem> {
    let mut options = RepositoryOptions::builder("/virtual");
    options_mut(&mut options);
    Repository::new(MemoryFileSystem::new("/virtual"), options).unwrap()
}

// --- S1: drop-folder ingest with overwrite=false ---------------------------

#[tokio::test]
async fn s1_drop_folder_ingest_with_overwrite_disabled() {
    let dir = tempfile::tempdir().unwrap();
    for (version, dep) in [
        ("1.11", None),
        ("1.9", None),
        ("2.0-alpha", None),
        ("2.0.0", None),
        ("2.0.0-0test", None),
        ("2.0.0-test+tag", None),
    ] {
        let bytes = build_nupkg("test", version, dep);
        std::fs::write(dir.path().join(format!("test.{version}.nupkg")), bytes).unwrap();
    }

    let fs = LocalFileSystem::new(dir.path()).unwrap();
    let mut options = RepositoryOptions::builder(dir.path());
    options.allow_override_existing_package_on_push = false;
    let repo = Repository::new(fs, options).unwrap();
    let token = CancellationToken::new();

    let ingested = repo.add_packages_from_drop_folder(&token).await.unwrap();
    assert_eq!(ingested, 6);

    let packages = repo.get_packages(Compatibility::Max, &token).await.unwrap();
    assert_eq!(packages.len(), 6);

    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let entry = entry.unwrap();
        assert!(
            !entry.file_name().to_string_lossy().ends_with(".nupkg"),
            "source archive should have been moved out of the drop folder"
        );
    }
}

// --- S2: removal and latest flags -------------------------------------------

#[tokio::test]
async fn s2_removal_recomputes_latest_flags() {
    let repo = memory_repo(|_| {});
    let token = CancellationToken::new();

    for version in [
        "1.11",
        "1.9",
        "2.0-alpha",
        "2.0.0",
        "2.0.0-0test",
        "2.0.0-test+tag",
        "2.0.1+taggedOnly",
    ] {
        repo.add_package(test_archive("test", version), &token)
            .await
            .unwrap();
    }

    for version in ["1.11", "2.0-alpha", "2.0.1", "2.0.0-0test"] {
        let normalized = feed_core::PackageVersion::parse(version).unwrap().normalized();
        repo.remove_package("test", &normalized, &token).await.unwrap();
    }

    let packages = repo.get_packages(Compatibility::Max, &token).await.unwrap();
    assert_eq!(packages.len(), 3);

    let latest: Vec<_> = packages.iter().filter(|p| p.semver2_is_latest).collect();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].version_normalized, "2.0.0");

    let absolute_latest: Vec<_> = packages
        .iter()
        .filter(|p| p.semver2_is_absolute_latest)
        .collect();
    assert_eq!(absolute_latest.len(), 1);
    assert_eq!(absolute_latest[0].version_normalized, "2.0.0");
}

// --- S3: delist semantics ----------------------------------------------------

#[tokio::test]
async fn s3_delist_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFileSystem::new(dir.path()).unwrap();
    let mut options = RepositoryOptions::builder(dir.path());
    options.enable_delisting = true;
    let repo = Repository::new(fs, options).unwrap();
    let token = CancellationToken::new();

    repo.add_package(test_archive("test1", "1.0"), &token).await.unwrap();
    repo.remove_package("test1", "1.0.0", &token).await.unwrap();

    let hits = repo
        .search("test1", &[], true, false, Compatibility::Max, &token)
        .await
        .unwrap();
    assert!(hits.is_empty(), "unlisted packages are hidden from search by default");

    let all = repo.get_packages(Compatibility::Max, &token).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(!all[0].listed);

    let package_file = dir.path().join("test1/1.0.0/test1.1.0.0.nupkg");
    assert!(package_file.exists(), "delisting must not delete the archive");
    let hidden_marker = dir.path().join("test1/1.0.0/test1.1.0.0.nupkg.hidden");
    assert!(hidden_marker.exists(), "delisted archive must carry the hidden marker");
}

// --- S4: case-insensitive id, build-metadata-agnostic version ----------------

#[tokio::test]
async fn s4_case_insensitive_id_and_build_metadata_agnostic_version() {
    let repo = memory_repo(|_| {});
    let token = CancellationToken::new();
    repo.add_package(test_archive("NuGet.Versioning", "3.5.0-beta2"), &token)
        .await
        .unwrap();

    let found = repo
        .find_package("nuget.versioning", "3.5.0-BETA2", &token)
        .await
        .unwrap();
    assert!(found.is_some());

    let missing = repo
        .find_package("NuGet.Frameworks", "3.5.0-beta2", &token)
        .await
        .unwrap();
    assert!(missing.is_none());
}

// --- S5: invalid cache filename -----------------------------------------------

#[test]
fn s5_invalid_cache_filename_rejected_at_construction() {
    let fs = MemoryFileSystem::new("/virtual");
    let mut options = RepositoryOptions::builder("/virtual");
    options.cache_file_name = Some("foo:bar/baz".to_string());
    let err = Repository::new(fs, options).unwrap_err();
    match err {
        Error::InvalidConfiguration(message) => assert!(message.contains("foo:bar/baz")),
        other => panic!("expected InvalidConfiguration, got {other:?}"),
    }
}

// --- S6: SemVer2 filtering -----------------------------------------------------

#[tokio::test]
async fn s6_semver2_filtering() {
    let repo = memory_repo(|_| {});
    let token = CancellationToken::new();

    repo.add_package(test_archive("test1", "1.0"), &token).await.unwrap();
    repo.add_package(test_archive("test2", "1.0-beta"), &token).await.unwrap();
    repo.add_package(test_archive("test3", "1.0-beta.1"), &token).await.unwrap();
    repo.add_package(test_archive("test4", "1.0-beta+foo"), &token).await.unwrap();
    repo.add_package(
        test_archive_with_dependency("test5", "1.0-beta", "1.0.0-semver2.1"),
        &token,
    )
    .await
    .unwrap();

    let mut default_ids: Vec<_> = repo
        .get_packages(Compatibility::Default, &token)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    default_ids.sort();
    assert_eq!(default_ids, vec!["test1", "test2"]);

    let max = repo.get_packages(Compatibility::Max, &token).await.unwrap();
    assert_eq!(max.len(), 5);
}

// --- invariant properties -----------------------------------------------------

#[tokio::test]
async fn invariant_rebuild_yields_one_record_per_archive() {
    let dir = tempfile::tempdir().unwrap();
    for version in ["1.0.0", "1.1.0", "2.0.0"] {
        let bytes = build_nupkg("demo", version, None);
        let nested = dir.path().join(format!("demo/{version}"));
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join(format!("demo.{version}.nupkg")), bytes).unwrap();
    }

    let fs = LocalFileSystem::new(dir.path()).unwrap();
    let options = RepositoryOptions::builder(dir.path());
    let repo = Repository::new(fs, options).unwrap();
    let token = CancellationToken::new();

    repo.rebuild(&token).await.unwrap();
    let packages = repo.get_packages(Compatibility::Max, &token).await.unwrap();
    assert_eq!(packages.len(), 3);
}

#[tokio::test]
async fn invariant_at_most_one_latest_flag_per_id() {
    let repo = memory_repo(|_| {});
    let token = CancellationToken::new();
    for version in ["1.0.0", "1.1.0", "1.2.0", "2.0.0-beta.1"] {
        repo.add_package(test_archive("demo", version), &token).await.unwrap();
    }
    let packages = repo.get_packages(Compatibility::Max, &token).await.unwrap();
    assert_eq!(packages.iter().filter(|p| p.semver2_is_latest).count(), 1);
    assert_eq!(packages.iter().filter(|p| p.semver2_is_absolute_latest).count(), 1);
    assert_eq!(packages.iter().filter(|p| p.semver1_is_latest).count(), 1);
    assert_eq!(packages.iter().filter(|p| p.semver1_is_absolute_latest).count(), 1);
}

#[tokio::test]
async fn invariant_exists_is_case_insensitive_and_ignores_build_metadata() {
    let repo = memory_repo(|_| {});
    let token = CancellationToken::new();
    repo.add_package(test_archive("Demo", "1.0.0+buildtag"), &token)
        .await
        .unwrap();
    assert!(repo.find_package("DEMO", "1.0.0", &token).await.unwrap().is_some());
    assert!(repo.find_package("demo", "1.0.0+other", &token).await.unwrap().is_some());
}

#[tokio::test]
async fn invariant_clear_cache_is_idempotent() {
    let repo = memory_repo(|_| {});
    let token = CancellationToken::new();
    repo.add_package(test_archive("demo", "1.0.0"), &token).await.unwrap();

    repo.clear_cache(&token).await.unwrap();
    let first = repo.get_packages(Compatibility::Max, &token).await.unwrap();
    repo.clear_cache(&token).await.unwrap();
    let second = repo.get_packages(Compatibility::Max, &token).await.unwrap();

    assert_eq!(first.len(), second.len());
    assert_eq!(first.len(), 1, "clear_cache forces a rebuild from disk, not permanent emptiness");
}

#[tokio::test]
async fn invariant_persist_then_load_round_trips_build_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFileSystem::new(dir.path()).unwrap();
    let mut options = RepositoryOptions::builder(dir.path());
    options.cache_file_name = Some("shared.cache.bin".to_string());
    let repo = Repository::new(fs, options).unwrap();
    let token = CancellationToken::new();
    repo.add_package(test_archive("demo", "1.0.0+buildtag"), &token)
        .await
        .unwrap();

    let cache_contents = repo.get_packages(Compatibility::Max, &token).await.unwrap();
    assert_eq!(cache_contents[0].version, "1.0.0+buildtag");
    drop(repo);

    // Remove the on-disk archive so nothing but the persisted cache file
    // can supply this record: a pass here proves the cache was actually
    // loaded and consulted rather than the engine rediscovering the
    // package by rebuilding from the package tree.
    std::fs::remove_dir_all(dir.path().join("demo")).unwrap();

    let fs2 = LocalFileSystem::new(dir.path()).unwrap();
    let mut options2 = RepositoryOptions::builder(dir.path());
    options2.cache_file_name = Some("shared.cache.bin".to_string());
    let repo2 = Repository::new(fs2, options2).unwrap();
    assert!(!repo2.needs_rebuild(), "a valid persisted cache must satisfy construction without a rebuild");
    let reloaded = repo2.get_packages(Compatibility::Max, &token).await.unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].version, "1.0.0+buildtag");
}

#[tokio::test]
async fn invariant_corrupt_cache_file_is_discarded_and_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = build_nupkg("demo", "1.0.0", None);
    let nested = dir.path().join("demo/1.0.0");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("demo.1.0.0.nupkg"), bytes).unwrap();

    let mut options = RepositoryOptions::builder(dir.path());
    options.cache_file_name = Some("repo.cache.bin".to_string());
    std::fs::write(dir.path().join("repo.cache.bin"), b"not json at all").unwrap();

    let fs = LocalFileSystem::new(dir.path()).unwrap();
    let repo = Repository::new(fs, options).unwrap();
    let token = CancellationToken::new();
    let packages = repo.get_packages(Compatibility::Max, &token).await.unwrap();
    assert_eq!(packages.len(), 1, "a corrupt cache file should not prevent rediscovery from disk");
}
