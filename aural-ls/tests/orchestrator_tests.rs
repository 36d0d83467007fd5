//! Orchestrator and training session tests
//!
//! Uses the recording fake backend so every training step is observable.

mod helpers;

use aural_common::events::AuralEvent;
use aural_ls::backend::VisualizationKind;
use aural_ls::models::{ClipId, LabelSet, STRIDES_PER_CLIP};
use aural_ls::services::OfferOutcome;
use aural_ls::Error;
use helpers::{
    clip_bytes, states_with_run, wait_until, RecordingFactory, TestEnv, BAD_CLIP_MARKER,
    WRONG_SHAPE_MARKER,
};
use std::collections::HashSet;
use std::time::Duration;

fn intent_states() -> Vec<u32> {
    states_with_run(STRIDES_PER_CLIP, 2..4, 1)
}

/// Store a clip and its intent label without offering it to a session
async fn labeled_clip(env: &TestEnv, seed: u8) -> ClipId {
    let id = env.orchestrator.put_clip(clip_bytes(seed)).await.unwrap();
    let set = LabelSet::new(id, "intent", intent_states());
    env.orchestrator.label_store().put(&set).await.unwrap();
    id
}

#[tokio::test]
async fn test_intent_label_round_trip() {
    let env = TestEnv::new(10).await;

    let id = env.orchestrator.put_clip(clip_bytes(1)).await.unwrap();
    let set = LabelSet::new(id, "intent", intent_states());
    env.orchestrator.put_label_set(set.clone()).await.unwrap();

    let stored = env.orchestrator.get_label_set(&id, "intent").await.unwrap();
    assert_eq!(stored.states, set.states);
    assert!(env.orchestrator.index().snapshot("intent").await.unwrap().contains(&id));
}

#[tokio::test]
async fn test_unknown_vocabulary_changes_no_snapshot() {
    let env = TestEnv::new(10).await;
    let id = env.orchestrator.put_clip(clip_bytes(1)).await.unwrap();

    let err = env
        .orchestrator
        .put_label_set(LabelSet::new(id, "unknown", intent_states()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownVocabulary(_)));

    for vocab in ["intent", "word", "speaker", "emotion"] {
        assert!(env.orchestrator.index().snapshot(vocab).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_accepted_label_reaches_training() {
    let env = TestEnv::new(1).await;
    let mut events = env.event_bus.subscribe();

    let id = env.orchestrator.put_clip(clip_bytes(7)).await.unwrap();
    env.orchestrator
        .put_label_set(LabelSet::new(id, "intent", intent_states()))
        .await
        .unwrap();

    let log = env.factory.log.clone();
    assert!(wait_until(|| {
        let log = log.clone();
        async move { log.batches("intent").len() == 1 }
    })
    .await);
    assert_eq!(log.batches("intent"), vec![vec![id]]);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type());
    }
    assert!(seen.contains(&"ClipStored"));
    assert!(seen.contains(&"LabelSetAccepted"));
}

#[tokio::test]
async fn test_concurrent_offers_never_share_a_batch() {
    let env = TestEnv::new(4).await;

    let mut ids = Vec::new();
    for seed in 0..20u8 {
        ids.push(labeled_clip(&env, seed).await);
    }

    let session = env.orchestrator.registry().get("intent").unwrap().clone();
    let mut tasks = tokio::task::JoinSet::new();
    for id in ids.clone() {
        let session = session.clone();
        tasks.spawn(async move { session.offer(id).await });
    }

    let mut trained = 0;
    while let Some(result) = tasks.join_next().await {
        if let OfferOutcome::Trained { batch_len, .. } = result.unwrap().unwrap() {
            assert_eq!(batch_len, 4);
            trained += 1;
        }
    }
    assert_eq!(trained, 5);

    let batches = env.factory.log.batches("intent");
    assert_eq!(batches.len(), 5);

    let mut seen = HashSet::new();
    for batch in &batches {
        for id in batch {
            assert!(seen.insert(*id), "clip {:?} trained twice", id);
        }
    }
    assert_eq!(seen, ids.into_iter().collect::<HashSet<_>>());
}

#[tokio::test]
async fn test_reoffered_clip_replaces_pending_entry() {
    let env = TestEnv::new(3).await;
    let id = labeled_clip(&env, 1).await;
    let session = env.orchestrator.registry().get("intent").unwrap();

    assert_eq!(session.offer(id).await.unwrap(), OfferOutcome::Buffered { pending: 1 });
    assert_eq!(session.offer(id).await.unwrap(), OfferOutcome::Buffered { pending: 1 });
    assert_eq!(session.status().await.unwrap().pending, 1);
}

#[tokio::test]
async fn test_bad_clip_is_dropped_without_touching_buffer() {
    let env = TestEnv::new(3).await;
    let good = labeled_clip(&env, 1).await;
    let bad = labeled_clip(&env, BAD_CLIP_MARKER).await;
    let session = env.orchestrator.registry().get("intent").unwrap();

    session.offer(good).await.unwrap();
    let err = session.offer(bad).await.unwrap_err();
    assert!(matches!(err, Error::FeatureExtractionFailed(_)));

    let status = session.status().await.unwrap();
    assert_eq!(status.pending, 1);
    assert_eq!(status.clips_dropped, 1);
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn test_wrong_shape_clip_is_dropped_without_touching_buffer() {
    let env = TestEnv::new(3).await;
    let good = labeled_clip(&env, 1).await;
    let wide = labeled_clip(&env, WRONG_SHAPE_MARKER).await;
    let session = env.orchestrator.registry().get("intent").unwrap();

    session.offer(good).await.unwrap();
    let err = session.offer(wide).await.unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }), "got {:?}", err);

    let status = session.status().await.unwrap();
    assert_eq!(status.pending, 1);
    assert_eq!(status.clips_dropped, 1);
    assert_eq!(status.steps_completed, 0);
}

#[tokio::test]
async fn test_offer_without_label_is_dropped() {
    let env = TestEnv::new(3).await;
    let id = env.orchestrator.put_clip(clip_bytes(5)).await.unwrap();
    let session = env.orchestrator.registry().get("intent").unwrap();

    assert!(matches!(session.offer(id).await, Err(Error::NotFound(_))));
    assert_eq!(session.status().await.unwrap().clips_dropped, 1);
}

#[tokio::test]
async fn test_failed_step_discards_batch() {
    let factory = RecordingFactory {
        fail_step: ["intent".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let env = TestEnv::with_factory(1, factory).await;
    let id = labeled_clip(&env, 1).await;
    let session = env.orchestrator.registry().get("intent").unwrap();

    assert!(matches!(session.offer(id).await, Err(Error::BackendFailure(_))));

    let status = session.status().await.unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.steps_completed, 0);
    assert_eq!(status.clips_since_checkpoint, 0);
}

#[tokio::test]
async fn test_save_failure_on_one_vocabulary_does_not_block_others() {
    let factory = RecordingFactory {
        fail_save: ["intent".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let env = TestEnv::with_factory(10, factory).await;

    let results = env.orchestrator.save_all_models().await;
    assert_eq!(results.len(), 4);

    for (vocab, result) in &results {
        let path = env.dir.path().join("models").join(format!("{}.ckpt", vocab));
        if vocab.as_str() == "intent" {
            assert!(matches!(result, Err(Error::BackendFailure(_))));
            assert!(!path.exists());
        } else {
            assert!(result.is_ok(), "{} failed: {:?}", vocab, result);
            assert!(path.exists());
        }
    }
}

#[tokio::test]
async fn test_save_resets_clip_counter() {
    let env = TestEnv::new(1).await;
    let id = labeled_clip(&env, 1).await;
    let session = env.orchestrator.registry().get("intent").unwrap();

    session.offer(id).await.unwrap();
    assert_eq!(session.status().await.unwrap().clips_since_checkpoint, 1);

    let checkpoint = session.save().await.unwrap();
    assert_eq!(checkpoint.clips_since_last, 1);
    assert_eq!(session.status().await.unwrap().clips_since_checkpoint, 0);
}

#[tokio::test]
async fn test_restart_restores_checkpoint_and_index() {
    let env = TestEnv::new(1).await;
    let a = labeled_clip(&env, 1).await;
    let b = labeled_clip(&env, 2).await;
    let session = env.orchestrator.registry().get("intent").unwrap();
    session.offer(a).await.unwrap();
    session.offer(b).await.unwrap();
    env.orchestrator.save_all_models().await;

    let TestEnv { dir, .. } = env;
    let reopened = TestEnv::open(dir, 1, RecordingFactory::default()).await;

    let snapshot = reopened.orchestrator.index().snapshot("intent").await.unwrap();
    assert_eq!(snapshot, [a, b].into_iter().collect::<HashSet<_>>());

    let checkpoint = reopened
        .orchestrator
        .registry()
        .get("intent")
        .unwrap()
        .save()
        .await
        .unwrap();
    assert_eq!(checkpoint.blob, b"intent:2".to_vec());
}

#[tokio::test]
async fn test_retrain_offers_every_indexed_clip() {
    let env = TestEnv::new(3).await;
    for seed in 1..=3 {
        labeled_clip(&env, seed).await;
    }

    let offered = env.orchestrator.retrain("intent").await.unwrap();
    assert_eq!(offered, 3);
    assert_eq!(env.factory.log.batches("intent").len(), 1);

    assert!(matches!(
        env.orchestrator.retrain("unknown").await,
        Err(Error::UnknownVocabulary(_))
    ));
}

#[tokio::test]
async fn test_step_delay_is_shared_and_adjustable() {
    let env = TestEnv::new(1).await;
    assert_eq!(env.orchestrator.step_delay(), 0);

    env.orchestrator.set_step_delay(25);
    assert_eq!(env.orchestrator.step_delay(), 25);

    let id = labeled_clip(&env, 1).await;
    let started = std::time::Instant::now();
    env.orchestrator
        .registry()
        .get("intent")
        .unwrap()
        .offer(id)
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(25));
}

#[tokio::test]
async fn test_failed_checkpoint_write_keeps_clip_counter() {
    let env = TestEnv::new(1).await;
    let id = labeled_clip(&env, 1).await;
    let session = env.orchestrator.registry().get("intent").unwrap();
    session.offer(id).await.unwrap();

    // A plain file where the models folder should be
    let models = env.dir.path().join("models");
    std::fs::remove_dir_all(&models).unwrap();
    std::fs::write(&models, b"").unwrap();

    let results = env.orchestrator.save_all_models().await;
    let (_, intent) = results.iter().find(|(v, _)| v.as_str() == "intent").unwrap();
    assert!(matches!(intent, Err(Error::StorageFailure(_))), "got {:?}", intent);

    let status = session.status().await.unwrap();
    assert_eq!(status.clips_since_checkpoint, 1);
    assert!(status.last_error.is_some());

    // Once the folder is back the same clips are reported
    std::fs::remove_file(&models).unwrap();
    std::fs::create_dir(&models).unwrap();
    let checkpoint = session.save().await.unwrap();
    assert_eq!(checkpoint.clips_since_last, 1);
    assert!(models.join("intent.ckpt").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_saves_all_succeed() {
    let env = TestEnv::new(1).await;
    let id = labeled_clip(&env, 1).await;
    env.orchestrator.registry().get("intent").unwrap().offer(id).await.unwrap();

    for _ in 0..25 {
        let (first, second) = tokio::join!(
            env.orchestrator.save_all_models(),
            env.orchestrator.save_all_models()
        );
        for (vocab, result) in first.iter().chain(second.iter()) {
            assert!(result.is_ok(), "{} failed: {:?}", vocab, result);
        }
    }

    // Only final checkpoint files remain
    let mut files: Vec<String> = std::fs::read_dir(env.dir.path().join("models"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(
        files,
        vec!["emotion.ckpt", "intent.ckpt", "speaker.ckpt", "word.ckpt"]
    );
    let blob = std::fs::read(env.dir.path().join("models").join("intent.ckpt")).unwrap();
    assert_eq!(blob, b"intent:1");
}

#[tokio::test]
async fn test_render_views() {
    let env = TestEnv::new(10).await;
    let id = labeled_clip(&env, 1).await;

    let labels = env
        .orchestrator
        .render(&id, "intent", VisualizationKind::Labels)
        .await
        .unwrap();
    assert!(labels.starts_with(&[0x89, b'P', b'N', b'G']));

    let features = env
        .orchestrator
        .render(&id, "intent", VisualizationKind::Spectrogram)
        .await
        .unwrap();
    assert!(features.starts_with(&[0x89, b'P', b'N', b'G']));

    for kind in [
        VisualizationKind::Probs,
        VisualizationKind::Argmax,
        VisualizationKind::States,
    ] {
        let png = env.orchestrator.render(&id, "intent", kind).await.unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']), "{} is not a PNG", kind);
    }

    // Model views need a stored clip but no label
    let unlabeled = env.orchestrator.put_clip(clip_bytes(9)).await.unwrap();
    assert!(env
        .orchestrator
        .render(&unlabeled, "word", VisualizationKind::Argmax)
        .await
        .is_ok());

    // No word label yet
    assert!(matches!(
        env.orchestrator.render(&id, "word", VisualizationKind::Labels).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_session_status_covers_every_vocabulary() {
    let env = TestEnv::new(10).await;
    let statuses = env.orchestrator.session_status().await.unwrap();

    let names: Vec<&str> = statuses.iter().map(|s| s.vocab_name.as_str()).collect();
    assert_eq!(names, vec!["emotion", "intent", "speaker", "word"]);
    assert!(statuses.iter().all(|s| s.pending == 0 && s.queue_depth == 0));
}

#[tokio::test]
async fn test_rebuild_event_emitted() {
    let env = TestEnv::new(10).await;
    let mut events = env.event_bus.subscribe();
    labeled_clip(&env, 1).await;

    assert_eq!(env.orchestrator.reconcile("intent").await.unwrap(), 1);

    let mut rebuilt = None;
    while let Ok(event) = events.try_recv() {
        if let AuralEvent::IndexRebuilt { vocab_name, clips, .. } = event {
            rebuilt = Some((vocab_name, clips));
        }
    }
    assert_eq!(rebuilt, Some(("intent".to_string(), 1)));
}

#[tokio::test]
async fn test_unindexed_vocabulary_reports_inconsistency() {
    use aural_ls::models::VocabName;
    use aural_ls::services::orchestrator::{Orchestrator, OrchestratorParts};
    use aural_ls::services::{CheckpointStore, SessionContext, SessionRegistry, TrainingIndex};
    use helpers::test_env::FEATURE_WIDTH;
    use helpers::FakeExtractor;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    let env = TestEnv::new(10).await;
    let clip_store = env.orchestrator.clip_store().clone();
    let label_store = env.orchestrator.label_store().clone();
    let extractor = Arc::new(FakeExtractor { width: FEATURE_WIDTH });
    let step_delay_ms = Arc::new(AtomicU64::new(0));

    let ctx = SessionContext {
        clip_store: clip_store.clone(),
        label_store: label_store.clone(),
        checkpoints: CheckpointStore::open(env.dir.path()).await.unwrap(),
        extractor: extractor.clone(),
        event_bus: env.event_bus.clone(),
        batch_size: 10,
        queue_capacity: 16,
        step_delay_ms: Arc::clone(&step_delay_ms),
    };
    let registry = SessionRegistry::start(
        env.orchestrator.vocabularies(),
        &RecordingFactory::default(),
        ctx,
    )
    .await
    .unwrap();

    // Index that only knows "word"
    let index = TrainingIndex::for_vocabularies(
        label_store.clone(),
        env.event_bus.clone(),
        [VocabName::from("word")],
    );
    let orchestrator = Orchestrator::from_parts(OrchestratorParts {
        clip_store,
        label_store,
        index,
        registry,
        extractor,
        event_bus: env.event_bus.clone(),
        step_delay_ms,
    });

    let id = orchestrator.put_clip(clip_bytes(7)).await.unwrap();
    let set = LabelSet::new(id, "intent", intent_states());
    let err = orchestrator.put_label_set(set.clone()).await.unwrap_err();
    assert!(matches!(err, Error::IndexInconsistency(_)));

    // The label is durable regardless
    assert_eq!(orchestrator.get_label_set(&id, "intent").await.unwrap(), set);
}
