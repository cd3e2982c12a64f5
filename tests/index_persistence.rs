//! Save/load round-trips and sizing behavior across every index variant.

use chrono::Utc;
use ragindex::error::{ConfigError, IndexError};
use ragindex::models::{IndexConfig, IvfParams};
use ragindex::services::index::{INFO_FILE, load_index, save_index};
use ragindex::services::{AnyIndex, IndexKind, VectorIndex};
use ragindex::utils::{gaussian_vector, seeded_rng};

const DIM: usize = 16;

fn vectors(n: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = seeded_rng(seed);
    (0..n).map(|_| gaussian_vector(&mut rng, DIM)).collect()
}

fn positions(n: usize) -> Vec<Option<String>> {
    (0..n).map(|i| Some(format!("doc_{i}"))).collect()
}

fn built(kind: IndexKind, data: &[Vec<f32>]) -> AnyIndex {
    let mut index = AnyIndex::new(kind, DIM, &IndexConfig::default()).unwrap();
    index.build(data).unwrap();
    index
}

#[test]
fn every_variant_roundtrips_with_identical_results() {
    let data = vectors(200, 1);
    let queries = vectors(5, 99);

    for kind in IndexKind::ALL {
        let dir = tempfile::tempdir().unwrap();
        let index = built(kind, &data);
        let info = save_index(dir.path(), &index, &positions(200), Utc::now()).unwrap();
        assert_eq!(info.variant, kind);
        assert_eq!(info.count, 200);

        let (loaded, loaded_positions, loaded_info) = load_index(dir.path(), DIM).unwrap();
        assert_eq!(loaded.kind(), kind);
        assert_eq!(loaded_positions, positions(200));
        assert_eq!(loaded_info, info);

        for query in &queries {
            let before = index.search(query, 10).unwrap();
            let after = loaded.search(query, 10).unwrap();
            assert_eq!(before.len(), after.len(), "{kind}");
            for (a, b) in before.iter().zip(&after) {
                assert_eq!(a.position, b.position, "{kind}");
                assert!((a.distance - b.distance).abs() < 1e-5, "{kind}");
            }
        }
    }
}

#[test]
fn loaded_incremental_index_accepts_more_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let data = vectors(50, 2);
    let index = built(IndexKind::Hnsw, &data);
    save_index(dir.path(), &index, &positions(50), Utc::now()).unwrap();

    let (mut loaded, _, _) = load_index(dir.path(), DIM).unwrap();
    let extra = vectors(1, 3);
    loaded.add(&extra).unwrap();
    assert_eq!(loaded.len(), 51);
    assert_eq!(loaded.search(&extra[0], 1).unwrap()[0].position, 50);
}

#[test]
fn load_rejects_provider_dimension_change() {
    let dir = tempfile::tempdir().unwrap();
    let index = built(IndexKind::Flat, &vectors(10, 4));
    save_index(dir.path(), &index, &positions(10), Utc::now()).unwrap();

    match load_index(dir.path(), DIM + 1) {
        Err(IndexError::Config(ConfigError::DimensionMismatch { expected, actual })) => {
            assert_eq!(expected, DIM);
            assert_eq!(actual, DIM + 1);
        }
        other => panic!("expected dimension mismatch, got {other:?}"),
    }
}

#[test]
fn tampered_info_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let index = built(IndexKind::Lsh, &vectors(10, 5));
    save_index(dir.path(), &index, &positions(10), Utc::now()).unwrap();

    let path = dir.path().join(INFO_FILE);
    let mut info: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    info["count"] = serde_json::json!(11);
    std::fs::write(&path, serde_json::to_vec(&info).unwrap()).unwrap();

    assert!(matches!(load_index(dir.path(), DIM), Err(IndexError::Corrupt(_))));
}

#[test]
fn ivf_caps_clusters_for_small_corpora() {
    let config = IndexConfig {
        ivf: IvfParams {
            n_clusters: 100,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut index = AnyIndex::new(IndexKind::Ivf, DIM, &config).unwrap();
    index.build(&vectors(100, 6)).unwrap();

    assert_eq!(index.params()["effective_clusters"], 2);
    assert_eq!(index.search(&vectors(1, 7)[0], 100).unwrap().len(), 100);
}

#[test]
fn training_variants_require_build() {
    for kind in [IndexKind::Ivf, IndexKind::IvfPq] {
        let mut index = AnyIndex::new(kind, DIM, &IndexConfig::default()).unwrap();
        assert!(!index.is_built());
        assert!(index.search(&vectors(1, 8)[0], 3).unwrap().is_empty());
        assert!(matches!(index.add(&vectors(1, 8)), Err(IndexError::NotTrained(_))));
        assert!(matches!(index.build(&[]), Err(IndexError::InsufficientData(_))));
    }
}

#[test]
fn search_never_exceeds_k_or_n() {
    let data = vectors(25, 9);
    let query = &vectors(1, 10)[0];
    for kind in IndexKind::ALL {
        let index = built(kind, &data);
        for k in [1, 5, 25, 60] {
            let results = index.search(query, k).unwrap();
            assert_eq!(results.len(), k.min(25), "{kind} k={k}");
            assert!(
                results.windows(2).all(|w| w[0].distance <= w[1].distance),
                "{kind} k={k}"
            );
        }
    }
}
