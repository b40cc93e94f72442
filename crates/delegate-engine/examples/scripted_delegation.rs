use std::sync::Arc;

use delegate_engine::prelude::*;
use delegate_engine::replay::{RuntimeScript, ScriptedRuntime};
use delegate_engine::runtime::Usage;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), EngineError> {
    delegate_engine::init_observability();

    let catalog = StaticCatalog::new()
        .with_tool(
            "googlecalendar",
            CatalogEntry::new(
                "GOOGLECALENDAR_CREATE_EVENT",
                Arc::new(FixedResponse(serde_json::json!({"eventId": "evt_42"}))),
            )
            .description("Create a calendar event"),
        )
        .with_tool(
            "gmail",
            CatalogEntry::new(
                "GMAIL_SEND_EMAIL",
                Arc::new(FixedResponse(serde_json::json!({"messageId": "msg_7"}))),
            ),
        );

    let runtime = ScriptedRuntime::new(
        RuntimeScript::new(vec![
            StreamEvent::tool_call(
                "call_1",
                "GOOGLECALENDAR_CREATE_EVENT",
                serde_json::json!({"title": "Design review", "start": "2026-10-20T10:00:00Z"}),
            ),
            StreamEvent::step_finish(FinishReason::ToolCalls),
            StreamEvent::tool_call(
                "call_2",
                "GMAIL_SEND_EMAIL",
                serde_json::json!({"to": "team@example.com", "subject": "Design review"}),
            ),
            StreamEvent::step_finish(FinishReason::ToolCalls),
            StreamEvent::text("Booked the design review and emailed the invite to the team."),
            StreamEvent::step_finish(FinishReason::Stop),
        ])
        .invoke_tools()
        .usage(Usage::new(512, 96)),
    );

    let engine = DelegateEngine::builder()
        .catalog(Arc::new(catalog))
        .runtime(Arc::new(runtime))
        .config(EngineConfig::default().max_steps(4))
        .build()?;

    let mut stream = engine.delegate(
        CallerContext::new("user-1").permit(["gmail", "googlecalendar"]),
        DelegateInput::new(
            vec!["googlecalendar", "gmail"],
            "Schedule a design review on Monday at 10:00 UTC and email the team",
        ),
    );
    while let Some(snapshot) = stream.next_snapshot().await {
        let pending = snapshot
            .tool_calls
            .iter()
            .filter(|call| call.status == ToolCallStatus::Pending)
            .count();
        println!(
            "progress: {} tool calls ({pending} pending)",
            snapshot.tool_calls.len()
        );
    }

    let result = stream.finish().await;
    println!("status: {:?}", result.status);
    println!("text: {}", result.final_text.as_deref().unwrap_or_default());
    println!("classification: {:?}", classify_snapshot(&result));
    Ok(())
}
