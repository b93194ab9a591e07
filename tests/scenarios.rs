//! End-to-end scenario tests mirroring the six concrete cases: spec
//! reproduction, nested brackets, batch atomicity, hybrid ranking,
//! cross-session recall, and a full reflection cycle.

use std::sync::Arc;

use thoughtmemory::{
    parse_and_store, Embedder, HashEmbedder, ParseAndStoreOptions, ReflectOptions,
    ReflectionEngine, ThoughtFilters, ThoughtGraph, ThoughtStore, VectorBackendKind,
};

fn store(dim: usize) -> ThoughtStore {
    ThoughtStore::open_in_memory(dim, VectorBackendKind::Dense).unwrap()
}

#[test]
fn scenario_spec_reproduction_and_nested_brackets() {
    let store = store(16);
    let embedder = HashEmbedder::new(16);

    let raw = "Initial analysis of the problem.\n\n\
               /thought[The user wants a recursive solution] \
               /thought[Edge cases include empty input and single elements] \
               Continuing the analysis.\n\n\
               /thought[Time complexity should be O(n log n)] \
               /thought[Space complexity is O(n) due to recursion] \
               Final assessment follows.";

    let result = parse_and_store(
        raw,
        &store,
        &embedder,
        ParseAndStoreOptions {
            session_id: "s1",
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(result.thoughts.len(), 4);
    assert!(!result.used_linear_fallback);

    let nested_raw = "Nested case: /thought[value [with nested] brackets survive] done.";
    let nested = parse_and_store(
        nested_raw,
        &store,
        &embedder,
        ParseAndStoreOptions {
            session_id: "s1",
            ..Default::default()
        },
    )
    .unwrap();
    assert!(nested.used_linear_fallback);
    assert_eq!(nested.thoughts[0].cleaned_text, "value [with nested] brackets survive");
}

#[test]
fn scenario_batch_atomicity() {
    let store = store(8);
    let embedder = HashEmbedder::new(8);
    let mut valid = thoughtmemory::Thought::new(None, "s1", "reasoning", 0.9, vec![], "ok", "ok", embedder.embed("ok")).unwrap();
    valid.embedding_dim = 8;
    let mut broken = thoughtmemory::Thought::new(None, "s1", "reasoning", 0.9, vec![], "bad", "bad", vec![1.0, 0.0]).unwrap();
    broken.embedding_dim = 2;

    let result = store.batch_store(vec![valid, broken]);
    assert!(result.is_err());
    assert!(store.retrieve(&ThoughtFilters::default(), 10).unwrap().is_empty());
}

#[test]
fn scenario_hybrid_ranking_prefers_closer_semantics_at_high_alpha() {
    let store = store(16);
    let embedder = HashEmbedder::new(16);

    for text in ["the launch plan is risky", "unrelated notes about lunch", "the launch plan needs review"] {
        let t = thoughtmemory::Thought::new(None, "s1", "reasoning", 0.9, vec![], text, text, embedder.embed(text)).unwrap();
        store.store(t).unwrap();
    }

    let hits = store
        .semantic_search(&embedder.embed("launch plan"), &ThoughtFilters::default(), 10, 0.9, 1000)
        .unwrap();
    assert!(hits[0].thought.cleaned_text.contains("launch"));
}

#[test]
fn scenario_cross_session_recall_via_lineage_and_graph_hops() {
    let store = Arc::new(store(16));
    let embedder = HashEmbedder::new(16);
    let graph = Arc::new(ThoughtGraph::new(store.clone()));

    store.create_session("parent", None, None).unwrap();
    let seed_text = "the deployment pipeline failed on staging";
    let seed = thoughtmemory::Thought::new(None, "parent", "reasoning", 0.9, vec![], seed_text, seed_text, embedder.embed(seed_text)).unwrap();
    let seed = store.store(seed).unwrap();
    graph.add_thought(&seed, false, 0, None, true).unwrap();

    let neighbor_text = "root cause was a stale cache entry";
    let neighbor = thoughtmemory::Thought::new(None, "parent", "reasoning", 0.9, vec![], neighbor_text, neighbor_text, embedder.embed(neighbor_text)).unwrap();
    let neighbor = store.store(neighbor).unwrap();
    graph.link(&seed.id, &neighbor.id, thoughtmemory::relation::EXPLICIT_REFERENCE, 1.0, false).unwrap();

    store.create_session("child", Some("parent"), None).unwrap();
    let child_text = "investigating the staging deployment failure";
    let child = thoughtmemory::Thought::new(None, "child", "reasoning", 0.9, vec![], child_text, child_text, embedder.embed(child_text)).unwrap();
    store.store(child).unwrap();

    let recalled = store
        .recall_from_prior_sessions(&embedder.embed("deployment pipeline failure"), "child", Some(&graph), 10, 0.9, 1)
        .unwrap();

    assert!(recalled.iter().any(|r| r.thought.id == seed.id));
    assert!(recalled.iter().any(|r| r.thought.id == neighbor.id));
}

#[test]
fn scenario_reflection_cycle_persists_and_links() {
    let store = Arc::new(store(16));
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
    let hash_embedder = HashEmbedder::new(16);
    let graph = Arc::new(ThoughtGraph::new(store.clone()));

    let prior_text = "previous reasoning about the migration rollback plan";
    let prior = thoughtmemory::Thought::new(None, "s1", "reasoning", 0.9, vec![], prior_text, prior_text, hash_embedder.embed(prior_text)).unwrap();
    store.store(prior).unwrap();

    let engine = ReflectionEngine::new(store.clone(), Some(graph), embedder);
    let result = engine
        .reflect(ReflectOptions {
            query: "migration rollback plan",
            current_session_id: "s1",
            mode: "planning",
            top_k: 5,
            reflection_session_id: None,
            llm_callable: None,
        })
        .unwrap();

    assert!(!result.stored_reflections.is_empty());
    assert!(!result.recalled_thoughts.is_empty());
    for t in &result.stored_reflections {
        assert_eq!(t.category, "plan");
        assert!(t.tags.contains(&"reflection".to_string()));
    }

    let all = store.retrieve(&ThoughtFilters::session("s1"), 50).unwrap();
    assert!(all.iter().any(|t| t.category == "plan"));
}
