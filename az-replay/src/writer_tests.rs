use std::fs;

use crate::{read_history, write_history, ReplayError, TrainingExample, TrainingExampleStore};
use safetensors::SafeTensors;

fn ex(tag: f32) -> TrainingExample {
    let z = if tag > 0.0 { 1.0 } else { -1.0 };
    TrainingExample::new(vec![tag, 0.0, 1.0], vec![0.25, 0.75], z)
}

#[test]
fn history_writes_expected_tensors() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("examples");

    let mut store = TrainingExampleStore::new(100, 10);
    store.append(3, vec![ex(1.0), ex(-1.0)]);
    write_history(&out, &store).unwrap();

    let st_path = out.join("iter_000003.safetensors");
    let meta_path = out.join("iter_000003.meta.json");
    assert!(st_path.exists());
    assert!(meta_path.exists());
    assert!(out.join("history.json").exists());

    let bytes = fs::read(&st_path).unwrap();
    let st = SafeTensors::deserialize(&bytes).unwrap();
    assert_eq!(st.tensor("features").unwrap().shape(), &[2, 3]);
    assert_eq!(st.tensor("pi").unwrap().shape(), &[2, 2]);
    assert_eq!(st.tensor("z").unwrap().shape(), &[2]);
}

#[test]
fn history_reads_back_batches_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("examples");

    let mut store = TrainingExampleStore::new(100, 10);
    store.append(1, vec![ex(1.0)]);
    store.append(2, vec![ex(2.0), ex(-2.0)]);
    write_history(&out, &store).unwrap();

    let batches = read_history(&out).unwrap();
    assert_eq!(
        batches.iter().map(|b| b.iteration).collect::<Vec<_>>(),
        vec![1, 2]
    );
    let restored = TrainingExampleStore::from_batches(100, 10, batches);
    assert_eq!(restored.all_examples(), store.all_examples());
}

#[test]
fn missing_index_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(read_history(dir.path()), Err(ReplayError::Io(_))));
}

#[test]
fn truncated_shard_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("examples");
    let mut store = TrainingExampleStore::new(100, 10);
    store.append(1, vec![ex(1.0)]);
    write_history(&out, &store).unwrap();

    fs::write(out.join("iter_000001.safetensors"), b"stub").unwrap();
    assert!(read_history(&out).is_err());
}

#[test]
fn cleanup_removes_only_tmp_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("iter_000001.safetensors.tmp"), b"x").unwrap();
    fs::write(dir.path().join("history.json"), b"{}").unwrap();
    crate::cleanup_tmp_files(dir.path()).unwrap();
    assert!(!dir.path().join("iter_000001.safetensors.tmp").exists());
    assert!(dir.path().join("history.json").exists());
}

#[test]
fn write_history_clears_leftovers_of_an_interrupted_write() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("examples");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("iter_000001.safetensors.tmp"), b"partial").unwrap();
    fs::write(out.join("history.json.tmp"), b"{").unwrap();

    let mut store = TrainingExampleStore::new(100, 10);
    store.append(1, vec![ex(1.0)]);
    write_history(&out, &store).unwrap();

    assert!(!out.join("iter_000001.safetensors.tmp").exists());
    assert!(!out.join("history.json.tmp").exists());
    assert_eq!(read_history(&out).unwrap().len(), 1);
}
