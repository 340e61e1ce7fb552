mod common;

use std::sync::Arc;

use common::{agent_config, ollama_config, refused_base_url, InterruptedAgent};
use nerd_research_agent::{
    prompts::Depth,
    provider::Dispatcher,
    report::run_research,
    session::ResearchSession,
};
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn research_run_prints_banner_fragments_and_footer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "{\"message\":{\"content\":\"Summary: \"}}\n{\"message\":{\"content\":\"tides.\"}}\n",
        ))
        .mount(&server)
        .await;

    let mut out = Vec::new();
    let outcome = run_research(
        &Dispatcher::default(),
        &ollama_config(&server.uri()),
        "tides",
        Depth::Deep,
        &mut out,
    )
    .await
    .expect("writing to a buffer succeeds");

    assert!(outcome.succeeded());
    assert_eq!(outcome.text, "Summary: tides.");

    let printed = String::from_utf8(out).expect("utf-8 output");
    assert!(printed.contains("NERD RESEARCH AGENT"));
    assert!(printed.contains("Provider: ollama\nModel: phi3\nCost: FREE (local)"));
    assert!(printed.contains("Topic: tides\nDepth: deep"));
    assert!(printed.contains("Summary: tides."));
    assert!(printed.contains("Research complete - "));
}

#[tokio::test]
async fn research_run_reports_transport_failure_once() {
    let mut out = Vec::new();
    let outcome = run_research(
        &Dispatcher::default(),
        &ollama_config(&refused_base_url().await),
        "tides",
        Depth::Standard,
        &mut out,
    )
    .await
    .expect("writing to a buffer succeeds");

    assert!(!outcome.succeeded());
    assert!(outcome.text.is_empty());

    let printed = String::from_utf8(out).expect("utf-8 output");
    assert_eq!(printed.matches("\nError: ").count(), 1);
    assert!(printed.contains("Make sure Ollama is running: ollama serve"));
    assert!(!printed.contains("Research complete"));
}

#[tokio::test]
async fn research_run_keeps_partial_text_when_stream_breaks() {
    let mut out = Vec::new();
    let outcome = run_research(
        &Dispatcher::new(Arc::new(InterruptedAgent)),
        &agent_config(),
        "tides",
        Depth::Quick,
        &mut out,
    )
    .await
    .expect("writing to a buffer succeeds");

    assert!(!outcome.succeeded());
    assert_eq!(outcome.text, "A");
    assert_eq!(outcome.error.as_deref(), Some("stream interrupted: upstream reset"));

    let printed = String::from_utf8(out).expect("utf-8 output");
    assert!(printed.contains("A\nError: stream interrupted: upstream reset\n"));
    assert_eq!(printed.matches("\nError: ").count(), 1);
    assert!(!printed.contains("never delivered"));
    assert!(!printed.contains("Research complete"));
}

#[tokio::test]
async fn session_records_turns_and_feeds_recent_questions_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains("Previous discussion:\\nQ: first question...\\n"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"message\":{\"content\":\"second answer\"}}"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "{\"message\":{\"content\":\"first \"}}\n{\"message\":{\"content\":\"answer\"}}\n",
        ))
        .mount(&server)
        .await;

    let mut session = ResearchSession::new(ollama_config(&server.uri()), Dispatcher::default());

    let mut seen = Vec::new();
    let first = session
        .ask("first question", |fragment| seen.push(fragment.to_owned()))
        .await
        .expect("first turn");
    assert_eq!(first, "first answer");
    assert_eq!(seen, vec!["first ", "answer"]);

    let second = session
        .ask("second question", |_| {})
        .await
        .expect("second turn");
    assert_eq!(second, "second answer");

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].question, "first question");
    assert_eq!(history[0].response, "first answer");
    assert_eq!(history[1].response, "second answer");
}

#[tokio::test]
async fn failed_turn_is_not_recorded() {
    let mut session = ResearchSession::new(
        ollama_config(&refused_base_url().await),
        Dispatcher::default(),
    );

    let result = session.ask("anyone there?", |_| {}).await;
    assert!(result.is_err());
    assert!(session.history().is_empty());
}
