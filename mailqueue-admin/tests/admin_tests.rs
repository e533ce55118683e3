//! Administrative flows over a viewed queue

use std::sync::Arc;

use futures_util::StreamExt;
use mailqueue_admin::{AdminConfig, DeadLetterHealth, MailQueueAdmin, QueueAdministration};
use mailqueue_view::{
    CompletionOutcome, Mail, MailKey, MailQueueName, MailQueueView, MailQueueViewConfig,
    MemoryStore, MemoryTransport, PayloadRef, ViewedMailQueue,
};
use pretty_assertions::assert_eq;

struct Fixture {
    queue: ViewedMailQueue,
    transport: MemoryTransport,
    admin: Arc<dyn QueueAdministration>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let transport = MemoryTransport::new();
    let config = MailQueueViewConfig {
        bucket_count: 4,
        ..MailQueueViewConfig::default()
    };
    let view = MailQueueView::builder(config, store)
        .build()
        .expect("Failed to build view");

    Fixture {
        queue: ViewedMailQueue::new("outgoing", Arc::new(transport.clone()), view.clone()),
        admin: Arc::new(MailQueueAdmin::with_transport(
            &AdminConfig::default(),
            view,
            Arc::new(transport.clone()),
        )),
        transport,
    }
}

fn mail(key: &str) -> Mail {
    Mail::new(key, PayloadRef::new(format!("spool/{key}"))).with_sender("sender@example.com")
}

#[tokio::test]
async fn test_operator_deletes_stuck_mail() {
    let fixture = fixture();
    let name = fixture.queue.name().clone();

    for key in ["a", "stuck", "b"] {
        fixture.queue.enqueue(&mail(key)).await.expect("enqueue");
    }

    assert_eq!(fixture.admin.list_queues().await.expect("queues"), vec![name.clone()]);
    assert_eq!(fixture.admin.get_size(&name).await.expect("size").count, 3);

    fixture
        .admin
        .delete_mail(&name, &MailKey::from("stuck"))
        .await
        .expect("delete");

    let mut browsed: Vec<String> = fixture
        .admin
        .browse(&name)
        .await
        .expect("browse")
        .map(|item| item.expect("partition").key.to_string())
        .collect()
        .await;
    browsed.sort();
    assert_eq!(browsed, vec!["a", "b"]);

    // The consumer never sees the deleted mail
    let mut delivered = Vec::new();
    while let Some(delivery) = fixture.queue.dequeue().await.expect("dequeue") {
        delivered.push(delivery.mail.key.to_string());
        fixture
            .queue
            .complete(&delivery, CompletionOutcome::Success)
            .await
            .expect("complete");
    }
    assert_eq!(delivered, vec!["a", "b"]);
    assert_eq!(fixture.admin.get_size(&name).await.expect("size").count, 0);
}

#[tokio::test]
async fn test_details_report_dead_letters() {
    let fixture = fixture();
    let name = fixture.queue.name().clone();

    fixture.queue.enqueue(&mail("bounce")).await.expect("enqueue");
    fixture.queue.enqueue(&mail("pending")).await.expect("enqueue");

    let delivery = fixture.queue.dequeue().await.expect("dequeue").expect("ready");
    fixture
        .queue
        .complete(&delivery, CompletionOutcome::Fail)
        .await
        .expect("complete");

    let details = fixture.admin.get_queue_details(&name).await.expect("details");
    assert_eq!(details.size.count, 1);
    assert_eq!(details.dead_letter, DeadLetterHealth::Degraded { depth: 1 });

    fixture.transport.close();
    let details = fixture.admin.get_queue_details(&name).await.expect("details");
    assert!(matches!(details.dead_letter, DeadLetterHealth::Unhealthy { .. }));
}

#[tokio::test]
async fn test_unknown_queue_browses_empty() {
    let fixture = fixture();
    let name = MailQueueName::from("never-used");

    let browsed: Vec<_> = fixture.admin.browse(&name).await.expect("browse").collect().await;
    assert!(browsed.is_empty());
    assert!(fixture.admin.get_queue_details(&name).await.is_err());
}
