//! The per-session normalization pipeline (§4.G): read, prenormalize,
//! cluster, canonicalize, classify, persist — with cancellation
//! checkpoints and stage-boundary progress events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use tracing::{info, instrument};

use refnorm_classifier::{ClassificationOutcome, Classifier};
use refnorm_dal::NormalizationDal;
use refnorm_models::{
    ClientProject, ClientProjectType, Group, ProcessingLevel, ProgressData, ProgressEvent, ProgressEventType, SessionState, SourceItem,
};
use refnorm_providers::{AggregationStrategy, CounterpartyRouter, ProviderOrchestrator};
use refnorm_similarity::{canonical_form, canonical_form_counterparty, hybrid_score, Weights};

use crate::event_bus::EventBus;
use crate::result_writer::ResultWriter;
use crate::session::{CancelToken, SessionManager};

const CANONICALIZE_SYSTEM_PROMPT: &str =
    "You receive a group of equivalent business-record names. Respond with only the single best canonical name for the group.";

/// Dependencies a worker needs, shared across every session it's handed.
/// The scheduler builds one of these per dispatch batch (cheap: every
/// field is an `Arc` clone or a primitive) so it can swap the classifier
/// for `use_kpved`/`use_okpd2` without touching the rest of the wiring.
#[derive(Clone)]
pub struct WorkerDeps {
    pub dal: Arc<dyn NormalizationDal>,
    pub bus: Arc<EventBus>,
    pub sessions: Arc<SessionManager>,
    pub result_writer: Arc<ResultWriter>,
    /// `None` when no generative provider is configured — canonicalize
    /// and classify both fall back to deterministic behavior (§4.G.5).
    pub orchestrator: Option<Arc<ProviderOrchestrator>>,
    pub counterparty_router: Option<Arc<CounterpartyRouter>>,
    pub classifier: Option<Arc<Classifier>>,
    pub cluster_threshold: f64,
    pub progress_increment: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed { processed: usize, groups: usize, errors: usize },
    Stopped { processed: usize, groups: usize },
    Failed,
}

struct Cluster {
    representative: String,
    items: Vec<SourceItem>,
}

/// Runs the full pipeline for one session. Returns once the session has
/// reached a terminal state in the DAL; the caller (the scheduler) is
/// only responsible for registering/deregistering this session's
/// cancellation handle around the call.
#[instrument(skip(deps, project, cancel), fields(session_id, database_id))]
pub async fn run_worker(deps: Arc<WorkerDeps>, session_id: i64, database_id: i64, project: ClientProject, cancel: CancelToken) -> WorkerOutcome {
    let started_at = Instant::now();

    // 1. Preflight.
    let stream = match deps.dal.get_database_items(database_id).await {
        Ok(stream) => stream,
        Err(err) => {
            let _ = deps.sessions.update(session_id, SessionState::Failed, Some(Utc::now())).await;
            emit(&deps, &project, session_id, database_id, ProgressEventType::Failed, ProgressData { message: Some(err.to_string()), ..Default::default() });
            return WorkerOutcome::Failed;
        }
    };
    if deps.sessions.update(session_id, SessionState::Running, None).await.is_err() {
        return WorkerOutcome::Failed;
    }

    // 2. Read.
    let items: Vec<SourceItem> = stream.filter_map(|row| async move { row.ok() }).collect().await;
    let total_items = items.len() as u64;
    emit(
        &deps,
        &project,
        session_id,
        database_id,
        ProgressEventType::Start,
        ProgressData { total_items: Some(total_items), original_count: Some(total_items), skipped_count: Some(0), ..Default::default() },
    );
    let _ = deps.sessions.update_activity(session_id).await;

    // 3-4. Prenormalize + cluster.
    let mut groups = match cluster_items(&deps, &project, session_id, database_id, items, total_items, &cancel).await {
        Ok(groups) => groups,
        Err(outcome) => return outcome,
    };

    // 5. Canonicalize.
    let mut errors = 0usize;
    for group in groups.iter_mut() {
        if cancel.is_cancelled() {
            return finalize_stopped_with(&deps, &project, session_id, database_id, &groups, total_items as usize).await;
        }
        canonicalize_group(&deps, &project, group, &mut errors).await;
    }

    // 6. Classify.
    for group in groups.iter_mut() {
        if cancel.is_cancelled() {
            return finalize_stopped_with(&deps, &project, session_id, database_id, &groups, total_items as usize).await;
        }
        classify_group(&deps, group).await;
    }

    // 7. Persist.
    let write_outcome = deps.result_writer.write(&groups, session_id, project.project_id, project.client_id, &deps.bus).await;
    if write_outcome.failed_batches > 0 || errors > 0 {
        emit(
            &deps,
            &project,
            session_id,
            database_id,
            ProgressEventType::Partial,
            ProgressData { message: Some(format!("{errors} canonicalization errors, {} failed batches", write_outcome.failed_batches)), ..Default::default() },
        );
    }

    // 8. Finalize.
    let _ = deps.sessions.update(session_id, SessionState::Completed, Some(Utc::now())).await;
    let duration = started_at.elapsed().as_secs_f64();
    let success_rate = if total_items == 0 { 1.0 } else { (total_items as f64 - errors as f64) / total_items as f64 };
    emit(
        &deps,
        &project,
        session_id,
        database_id,
        ProgressEventType::Completed,
        ProgressData {
            total_processed: Some(total_items),
            duration_seconds: Some(duration),
            items_per_second: Some(if duration > 0.0 { total_items as f64 / duration } else { total_items as f64 }),
            success_rate: Some(success_rate),
            ..Default::default()
        },
    );
    info!(session_id, total_items, groups = groups.len(), errors, "worker completed");
    WorkerOutcome::Completed { processed: total_items as usize, groups: groups.len(), errors }
}

async fn cluster_items(
    deps: &Arc<WorkerDeps>,
    project: &ClientProject,
    session_id: i64,
    database_id: i64,
    items: Vec<SourceItem>,
    total_items: u64,
    cancel: &CancelToken,
) -> Result<Vec<Group>, WorkerOutcome> {
    let weights = Weights::balanced();
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut blocks: HashMap<String, Vec<usize>> = HashMap::new();
    let prenormalize: fn(&str) -> String =
        if project.project_type == ClientProjectType::Counterparty { canonical_form_counterparty } else { canonical_form };

    for (index, item) in items.into_iter().enumerate() {
        if cancel.is_cancelled() {
            let partial_groups: Vec<Group> = clusters.into_iter().map(|c| Group::from_cluster(c.items)).collect();
            let group_count = partial_groups.len();
            deps.result_writer.write(&partial_groups, session_id, project.project_id, project.client_id, &deps.bus).await;
            let _ = deps.sessions.update(session_id, SessionState::Stopped, Some(Utc::now())).await;
            emit(
                deps,
                project,
                session_id,
                database_id,
                ProgressEventType::Stopped,
                ProgressData { processed: Some(index as u64), total: Some(total_items), ..Default::default() },
            );
            return Err(WorkerOutcome::Stopped { processed: index, groups: group_count });
        }

        let canonical = prenormalize(&item.raw_name);
        let key: String = canonical.chars().take(3).collect();
        let existing = blocks.entry(key).or_default();

        let mut placed = false;
        for &cluster_index in existing.iter() {
            let score = hybrid_score(&canonical, &clusters[cluster_index].representative, weights);
            if score > deps.cluster_threshold {
                clusters[cluster_index].items.push(item);
                placed = true;
                break;
            }
        }
        if !placed {
            existing.push(clusters.len());
            clusters.push(Cluster { representative: canonical, items: vec![item] });
        }

        let processed = (index + 1) as u64;
        if processed % deps.progress_increment == 0 {
            emit(
                deps,
                project,
                session_id,
                database_id,
                ProgressEventType::Progress,
                ProgressData {
                    processed: Some(processed),
                    total: Some(total_items),
                    progress_percent: Some(processed as f64 / total_items.max(1) as f64 * 100.0),
                    current_step: Some("cluster".to_string()),
                    ..Default::default()
                },
            );
        }
    }

    Ok(clusters.into_iter().map(|c| Group::from_cluster(c.items)).collect())
}

async fn canonicalize_group(deps: &Arc<WorkerDeps>, project: &ClientProject, group: &mut Group, errors: &mut usize) {
    let Some(orchestrator) = deps.orchestrator.as_ref() else {
        group.canonical_name = group.longest_member_name().to_string();
        group.processing_level = ProcessingLevel::Canonicalized;
        return;
    };

    let member_names: Vec<&str> = group.items.iter().map(|i| i.raw_name.as_str()).collect();
    let category = group.category.clone().unwrap_or_default();
    let user_prompt = format!("category: {category}\nnames:\n{}", member_names.join("\n"));

    let result = if project.project_type == ClientProjectType::Counterparty {
        if let Some(router) = deps.counterparty_router.as_ref() {
            router.normalize(CANONICALIZE_SYSTEM_PROMPT, &user_prompt, AggregationStrategy::FirstSuccess).await
        } else {
            orchestrator.dispatch(CANONICALIZE_SYSTEM_PROMPT, &user_prompt, AggregationStrategy::FirstSuccess).await
        }
    } else {
        orchestrator.dispatch(CANONICALIZE_SYSTEM_PROMPT, &user_prompt, AggregationStrategy::FirstSuccess).await
    };

    match result.chosen {
        Some(completion) => {
            group.canonical_name = completion.text;
            group.ai_confidence = completion.confidence;
        }
        None => {
            group.canonical_name = group.longest_member_name().to_string();
            group.attributes.insert("ai_error".to_string(), "canonicalization_failed".to_string());
            *errors += 1;
        }
    }
    group.processing_level = ProcessingLevel::Canonicalized;
}

async fn classify_group(deps: &Arc<WorkerDeps>, group: &mut Group) {
    let Some(classifier) = deps.classifier.as_ref() else { return };
    match classifier.classify(&group.canonical_name, group.category.as_deref()).await {
        ClassificationOutcome::Classified { code, name, confidence } => {
            group.classifier_code = Some(code);
            group.classifier_name = Some(name);
            group.classifier_confidence = confidence;
            group.processing_level = ProcessingLevel::Classified;
        }
        ClassificationOutcome::Unclassified => {}
    }
}

async fn finalize_stopped_with(
    deps: &Arc<WorkerDeps>, project: &ClientProject, session_id: i64, database_id: i64, groups: &[Group], total_items: usize,
) -> WorkerOutcome {
    deps.result_writer.write(groups, session_id, project.project_id, project.client_id, &deps.bus).await;
    let _ = deps.sessions.update(session_id, SessionState::Stopped, Some(Utc::now())).await;
    emit(
        deps,
        project,
        session_id,
        database_id,
        ProgressEventType::Stopped,
        ProgressData { processed: Some(groups.len() as u64), total: Some(total_items as u64), ..Default::default() },
    );
    WorkerOutcome::Stopped { processed: total_items, groups: groups.len() }
}

fn emit(deps: &Arc<WorkerDeps>, project: &ClientProject, session_id: i64, database_id: i64, event_type: ProgressEventType, data: ProgressData) {
    deps.bus.publish(ProgressEvent::new(event_type, project.client_id, project.project_id, data).with_session(session_id, database_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use refnorm_dal::InMemoryDal;
    use refnorm_models::{ClientProjectType, DatabaseDescriptor};

    fn deps(dal: Arc<dyn NormalizationDal>) -> Arc<WorkerDeps> {
        Arc::new(WorkerDeps {
            dal: dal.clone(),
            bus: Arc::new(EventBus::new(64)),
            sessions: Arc::new(SessionManager::new(dal.clone())),
            result_writer: Arc::new(ResultWriter::new(dal, 500)),
            orchestrator: None,
            counterparty_router: None,
            classifier: None,
            cluster_threshold: 0.85,
            progress_increment: 50,
        })
    }

    fn project() -> ClientProject {
        ClientProject { client_id: 1, project_id: 10, name: "acme".into(), project_type: ClientProjectType::Nomenclature }
    }

    #[tokio::test]
    async fn similar_items_merge_into_one_group_with_deterministic_canonical_name() {
        let dal_impl = Arc::new(InMemoryDal::new());
        dal_impl.seed_database(DatabaseDescriptor { id: 1, project_id: 10, name: "db-1".into(), active: true });
        dal_impl.seed_items(1, vec![SourceItem::new("a", "A1", "Winter Tire 205/55"), SourceItem::new("b", "A2", "winter tire 205-55")]);
        let dal: Arc<dyn NormalizationDal> = dal_impl.clone();
        let deps = deps(dal.clone());

        let (session_id, _) = deps.sessions.try_create(1, 0, 60).await.unwrap();
        let outcome = run_worker(deps.clone(), session_id, 1, project(), CancelToken::new()).await;

        match outcome {
            WorkerOutcome::Completed { processed, groups, .. } => {
                assert_eq!(processed, 2);
                assert_eq!(groups, 1);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        let batch = dal_impl.committed_batch(session_id);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].merged_count, 2);
        assert!(!batch[0].canonical_name.is_empty());
    }

    // A name built from one index-varying digit ("item-0-unique-xyz" vs "item-1-unique-xyz")
    // differs in a single character out of eighteen, which is similar enough under the hybrid
    // kernel to clear the 0.85 cluster threshold. Combine two independently-varying words
    // instead so every pair differs in a large share of the string.
    fn unique_item_name(i: usize) -> String {
        const NOUNS: [&str; 32] = [
            "anchor", "beacon", "cactus", "dynamo", "ember", "falcon", "granite", "harbor", "inkwell", "jigsaw",
            "kernel", "lantern", "meadow", "nebula", "oracle", "piston", "quartz", "raven", "silo", "talon",
            "umbrella", "vertex", "willow", "xenon", "yonder", "zephyr", "basalt", "cobalt", "drizzle", "echo",
            "fable", "glacier",
        ];
        const ADJECTIVES: [&str; 32] = [
            "azure", "crimson", "emerald", "golden", "ivory", "jade", "lavender", "magenta", "amber", "coral",
            "ebony", "fuchsia", "indigo", "maroon", "olive", "peach", "ruby", "saffron", "teal", "obsidian",
            "violet", "walnut", "bronze", "copper", "pewter", "silver", "platinum", "indium", "cerulean",
            "scarlet", "ochre", "sepia",
        ];
        let noun = NOUNS[i % NOUNS.len()];
        let adjective = ADJECTIVES[i / NOUNS.len()];
        format!("{noun} {adjective}")
    }

    #[tokio::test]
    async fn distinct_items_each_become_their_own_group() {
        let dal_impl = Arc::new(InMemoryDal::new());
        dal_impl.seed_database(DatabaseDescriptor { id: 1, project_id: 10, name: "db-1".into(), active: true });
        let items: Vec<SourceItem> = (0..1000).map(|i| SourceItem::new(i.to_string(), i.to_string(), unique_item_name(i))).collect();
        dal_impl.seed_items(1, items);
        let dal: Arc<dyn NormalizationDal> = dal_impl.clone();
        let deps = deps(dal.clone());

        let (session_id, _) = deps.sessions.try_create(1, 0, 60).await.unwrap();
        let outcome = run_worker(deps, session_id, 1, project(), CancelToken::new()).await;
        match outcome {
            WorkerOutcome::Completed { processed, groups, .. } => {
                assert_eq!(processed, 1000);
                assert_eq!(groups, 1000);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelling_before_the_worker_starts_clustering_stops_with_no_groups_persisted() {
        let dal_impl = Arc::new(InMemoryDal::new());
        dal_impl.seed_database(DatabaseDescriptor { id: 1, project_id: 10, name: "db-1".into(), active: true });
        dal_impl.seed_items(1, vec![SourceItem::new("a", "A1", "Tire")]);
        let dal: Arc<dyn NormalizationDal> = dal_impl.clone();
        let deps = deps(dal.clone());

        let (session_id, _) = deps.sessions.try_create(1, 0, 60).await.unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = run_worker(deps, session_id, 1, project(), cancel).await;
        assert!(matches!(outcome, WorkerOutcome::Stopped { .. }));
        let session = dal_impl.get_normalization_session(session_id).await.unwrap();
        assert_eq!(session.state, refnorm_models::SessionState::Stopped);
        assert!(dal_impl.committed_batch(session_id).is_empty());
    }
}
