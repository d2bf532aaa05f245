use std::fs;
use std::path::PathBuf;

use video_loudness_batch_normalize::{Error, find_video_files};

#[test]
fn finds_videos_recursively_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let files = [
        "a.mp4",
        "b.MKV",
        "notes.txt",
        "song.mp3",
        "a.mp4.normalized",
        "a.temp_normalized.mp4",
        "season 1/ep1.mov",
        "season 1/extras/clip.Avi",
        "season 1/extras/trailer.webm",
        "season 1/extras/cover.jpg",
    ];
    for name in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }
    // directories named like videos are not candidates
    fs::create_dir(dir.path().join("folder.mp4")).unwrap();

    let found: Vec<PathBuf> = find_video_files(dir.path())
        .unwrap()
        .into_iter()
        .map(|record| record.path.strip_prefix(dir.path()).unwrap().to_path_buf())
        .collect();

    assert_eq!(
        found,
        [
            "a.mp4",
            "b.MKV",
            "season 1/ep1.mov",
            "season 1/extras/clip.Avi",
            "season 1/extras/trailer.webm",
        ]
        .map(PathBuf::from)
    );
}

#[test]
fn records_carry_derived_paths() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("movie.mkv"), b"").unwrap();

    let records = find_video_files(dir.path()).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].marker_path, dir.path().join("movie.mkv.normalized"));
    assert_eq!(records[0].temp_path, dir.path().join("movie.temp_normalized.mkv"));
    assert!(!records[0].is_normalized());
}

#[test]
fn empty_directory_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(find_video_files(dir.path()).unwrap().is_empty());
}

#[test]
fn root_must_be_an_existing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("clip.mp4");
    fs::write(&file, b"").unwrap();

    assert!(matches!(
        find_video_files(dir.path().join("missing")),
        Err(Error::InvalidOptions(_))
    ));
    assert!(matches!(
        find_video_files(&file),
        Err(Error::InvalidOptions(_))
    ));
}

#[cfg(unix)]
#[test]
fn symlinked_videos_are_candidates() {
    let outside = tempfile::tempdir().unwrap();
    let real = outside.path().join("real.mp4");
    fs::write(&real, b"video").unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(&real, dir.path().join("linked.mp4")).unwrap();
    // dangling links are not files
    std::os::unix::fs::symlink(outside.path().join("gone.mp4"), dir.path().join("dangling.mp4"))
        .unwrap();

    let records = find_video_files(dir.path()).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, dir.path().join("linked.mp4"));
    assert_eq!(records[0].marker_path, dir.path().join("linked.mp4.normalized"));
}
