//! Session-level post-conversation processing: one pipeline, enqueued once
//! per session activity burst, idempotent by job id.

use std::sync::Arc;

use tracing::{debug, info};

use whisperengine_queue::{QueueName, TaskQueue};

/// Minimum messages in a session before the pipeline is worth running.
pub const MIN_SESSION_MESSAGES: usize = 2;

/// Enqueue the full post-conversation pipeline for one session.  Each
/// capability is a distinct job with a deterministic id, so back-to-back
/// calls collapse into one execution per capability.
pub async fn enqueue_post_conversation_tasks(
    queue: &Arc<TaskQueue>,
    user_id: &str,
    bot_name: &str,
    session_id: &str,
    user_name: &str,
    trigger: &str,
) {
    info!(session_id, user_id, trigger, "enqueueing post-conversation pipeline");

    let base = serde_json::json!({
        "user_id": user_id,
        "bot_name": bot_name,
        "session_id": session_id,
        "user_name": user_name,
        "trigger": trigger,
    });

    // (task, queue, job id) — session-scoped capabilities key on the
    // session, user-scoped ones on (user, bot).
    let jobs: [(&str, QueueName, String); 6] = [
        (
            "run_batch_knowledge_extraction",
            QueueName::Cognition,
            format!("knowledge_{session_id}"),
        ),
        (
            "run_batch_preference_extraction",
            QueueName::Cognition,
            format!("preferences_{session_id}"),
        ),
        (
            "run_batch_goal_analysis",
            QueueName::Cognition,
            format!("goals_{session_id}"),
        ),
        (
            "run_summarization",
            QueueName::Cognition,
            format!("summarize_{session_id}"),
        ),
        (
            "run_reflection",
            QueueName::Cognition,
            format!("reflection_{user_id}_{bot_name}"),
        ),
        (
            "run_insight_analysis",
            QueueName::Cognition,
            format!("insight_{user_id}_{bot_name}"),
        ),
    ];

    for (task, queue_name, job_id) in jobs {
        match queue
            .enqueue(task, queue_name, Some(job_id), None, base.clone())
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => debug!(task, "already pending; skipped"),
            Err(err) => debug!(task, %err, "enqueue failed (non-blocking)"),
        }
    }
}

/// Enqueue graph enrichment for sessions with enough material.
pub async fn enqueue_graph_enrichment(
    queue: &Arc<TaskQueue>,
    session_id: &str,
    user_id: &str,
    channel_id: Option<&str>,
    server_id: Option<&str>,
    bot_name: &str,
) {
    let channel_ref = channel_id
        .map(str::to_string)
        .unwrap_or_else(|| format!("dm:{user_id}"));
    let payload = serde_json::json!({
        "session_id": session_id,
        "user_id": user_id,
        "channel_id": channel_ref,
        "server_id": server_id,
        "bot_name": bot_name,
    });
    let _ = queue
        .enqueue(
            "run_graph_enrichment",
            QueueName::Cognition,
            Some(format!("enrich_{session_id}")),
            None,
            payload,
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisperengine_queue::InMemoryBroker;

    #[tokio::test]
    async fn pipeline_enqueues_all_capabilities_once() {
        let queue = Arc::new(TaskQueue::new(Arc::new(InMemoryBroker::new())));

        // Call back-to-back three times; each capability runs once.
        for _ in 0..3 {
            enqueue_post_conversation_tasks(&queue, "u1", "elena", "s1", "Mark", "session_activity")
                .await;
        }

        let mut tasks = Vec::new();
        while let Some(job) = queue.pop(QueueName::Cognition).await.unwrap() {
            tasks.push((job.task.clone(), job.job_id.clone()));
        }
        assert_eq!(tasks.len(), 6, "exactly one job per capability");
        assert!(tasks.iter().any(|(_, id)| id == "summarize_s1"));
        assert!(tasks.iter().any(|(t, _)| t == "run_reflection"));
    }

    #[tokio::test]
    async fn different_sessions_get_their_own_summaries() {
        let queue = Arc::new(TaskQueue::new(Arc::new(InMemoryBroker::new())));
        enqueue_post_conversation_tasks(&queue, "u1", "elena", "s1", "Mark", "t").await;
        enqueue_post_conversation_tasks(&queue, "u1", "elena", "s2", "Mark", "t").await;

        let mut summaries = 0;
        while let Some(job) = queue.pop(QueueName::Cognition).await.unwrap() {
            if job.task == "run_summarization" {
                summaries += 1;
            }
        }
        assert_eq!(summaries, 2);
    }

    #[tokio::test]
    async fn enrichment_uses_dm_reference_without_channel() {
        let queue = Arc::new(TaskQueue::new(Arc::new(InMemoryBroker::new())));
        enqueue_graph_enrichment(&queue, "s1", "u1", None, None, "elena").await;
        let job = queue.pop(QueueName::Cognition).await.unwrap().unwrap();
        assert_eq!(job.payload["channel_id"], "dm:u1");
    }
}
