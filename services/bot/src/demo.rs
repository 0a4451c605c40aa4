use async_trait::async_trait;
use chrono::Utc;
use clap::Args;
use fame_catalog::config::{ModerationConfig, DEFAULT_CATALOG_BASE_URL};
use fame_catalog::error::AppError;
use fame_catalog::workflows::catalog::{
    CardQuery, CatalogRepository, Command, DeliveryError, Dispatcher, Event, ImageUpload,
    MediaError, MediaStore, MemorySessionStore, MemoryStore, Notice, Notifier, Payload, PhotoRef,
    Reply, Submitter, UserId,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Identity used for the admin side of the demo
    #[arg(long, default_value_t = 1)]
    pub(crate) admin_id: i64,
    /// Identity used for the submitter side of the demo
    #[arg(long, default_value_t = 42)]
    pub(crate) submitter_id: i64,
    /// Handle the demo submitter applies with
    #[arg(long, default_value = "alex99")]
    pub(crate) handle: String,
}

struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn deliver(&self, recipient: UserId, notice: Notice) -> Result<(), DeliveryError> {
        println!("  -> notice for {recipient}:");
        for line in notice.text().lines() {
            println!("     | {line}");
        }
        Ok(())
    }
}

/// Keeps no bytes; hands back a reference derived from the file id.
struct DemoAvatars;

#[async_trait]
impl MediaStore for DemoAvatars {
    async fn store(&self, upload: &ImageUpload) -> Result<PhotoRef, MediaError> {
        Ok(PhotoRef(format!("avatars/{}.jpg", upload.file_id)))
    }
}

fn print_replies(label: &str, replies: &[Reply]) {
    println!("[{label}]");
    for reply in replies {
        for line in reply.text.lines() {
            println!("  {line}");
        }
        if !reply.controls.is_empty() {
            let controls: Vec<String> = reply
                .controls
                .iter()
                .map(|control| format!("{} ({})", control.label, control.action))
                .collect();
            println!("  controls: {}", controls.join(", "));
        }
    }
    println!();
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        admin_id,
        submitter_id,
        handle,
    } = args;

    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(ConsoleNotifier),
        Arc::new(MemorySessionStore::default()),
        Arc::new(DemoAvatars),
        &ModerationConfig {
            admin_ids: vec![UserId(admin_id)],
            catalog_base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            pending_page_size: 5,
        },
    );

    let submitter = Submitter {
        id: UserId(submitter_id),
        username: Some(handle.clone()),
        first_name: "Alex".to_string(),
        last_name: None,
    };
    let admin = Submitter {
        id: UserId(admin_id),
        username: None,
        first_name: "Admin".to_string(),
        last_name: None,
    };

    println!("Fame catalog demo ({})", Utc::now().format("%Y-%m-%d %H:%M UTC"));
    println!();

    let text = |value: &str| Payload::Text {
        text: value.to_string(),
    };
    let action = |value: &str| Payload::Action {
        data: value.to_string(),
    };
    let intake = vec![
        ("submitter: /start", Payload::Command { name: Command::Start }),
        ("submitter: /apply", Payload::Command { name: Command::Apply }),
        (
            "submitter: photo",
            Payload::Photo(ImageUpload {
                file_id: "demo-photo".to_string(),
                mime_type: Some("image/jpeg".to_string()),
                bytes: None,
            }),
        ),
        ("submitter: name", text("Alex")),
        ("submitter: handle", text(&handle)),
        ("submitter: category", action("category:small")),
        ("submitter: channel", text("skip")),
        ("submitter: description", text("Runs a small tech channel.")),
        ("submitter: confirm", action("confirm:yes")),
    ];
    for (label, payload) in intake {
        let replies = dispatcher
            .dispatch(Event {
                from: submitter.clone(),
                payload,
            })
            .await;
        print_replies(label, &replies);
    }

    let replies = dispatcher
        .dispatch(Event {
            from: admin.clone(),
            payload: action("admin:applications"),
        })
        .await;
    print_replies("admin: pending applications", &replies);

    let Some(approve) = replies
        .first()
        .and_then(|reply| reply.controls.first())
        .map(|control| control.action.to_string())
    else {
        println!("No pending application to approve.");
        return Ok(());
    };
    let replies = dispatcher
        .dispatch(Event {
            from: admin,
            payload: action(&approve),
        })
        .await;
    print_replies("admin: approve", &replies);

    let cards = store.list_cards(&CardQuery::default()).await?;
    println!("Catalog now holds {} card(s):", cards.len());
    for card in cards {
        println!(
            "  #{} {} (@{}) in {}",
            card.id, card.name, card.handle, card.category_display_name
        );
    }

    Ok(())
}
