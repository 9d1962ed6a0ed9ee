mod common;

use std::{fs, path::PathBuf};

use common::Recording;
use glob::glob;
use xpipe::{
    Xml11Configuration, XmlParserConfiguration, XmlPullParserConfiguration, xni::XmlInputSource,
};

fn data_files(dir: &str) -> Vec<PathBuf> {
    let pattern = format!("{}/tests/data/{dir}/*.xml", env!("CARGO_MANIFEST_DIR"));
    let files = glob(&pattern)
        .expect("valid glob pattern")
        .collect::<Result<Vec<_>, _>>()
        .expect("readable test data");
    assert!(!files.is_empty(), "no test data under {pattern}");
    files
}

fn input(path: &PathBuf) -> XmlInputSource {
    let bytes = fs::read(path).unwrap();
    XmlInputSource::from_bytes(bytes).with_system_id(path.to_string_lossy())
}

#[test]
fn valid_documents_test() {
    let mut config = Xml11Configuration::new();
    let recording = Recording::new();
    recording.attach(&mut config);
    for path in data_files("valid") {
        recording.clear();
        let result = config.parse(input(&path));
        assert!(result.is_ok(), "{}: {:?}", path.display(), result);
        assert!(
            recording.errors().is_empty(),
            "{}: {:?}",
            path.display(),
            recording.errors()
        );
        assert!(
            recording.events().last().is_some_and(|e| e == "endDocument"),
            "{}",
            path.display()
        );
    }
}

#[test]
fn invalid_documents_test() {
    let mut config = Xml11Configuration::new();
    let recording = Recording::new();
    recording.attach(&mut config);
    for path in data_files("invalid") {
        recording.clear();
        let result = config.parse(input(&path));
        assert!(
            result.is_err() || !recording.errors().is_empty(),
            "{} was accepted",
            path.display()
        );
    }
}

#[test]
fn incremental_matches_complete_test() {
    for path in data_files("valid") {
        let mut config = Xml11Configuration::new();
        let complete = Recording::new();
        complete.attach(&mut config);
        config.parse(input(&path)).unwrap();

        let incremental = Recording::new();
        incremental.attach(&mut config);
        config.set_input_source(input(&path));
        while config.parse_step(false).unwrap() {}
        config.cleanup();
        assert_eq!(incremental.events(), complete.events(), "{}", path.display());
    }
}
