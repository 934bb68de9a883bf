//! Chains over a scripted model: templates, sequential composition and memory.

mod common;

use common::mocks::{MockLLMClient, RecordedCall, ScriptedLLMClient};
use ragchain::chains::{Chain, ChainValues, LLMChain, SequentialChain, SimpleSequentialChain};
use ragchain::memory::ConversationMemory;
use ragchain::prompts::PromptTemplate;
use ragchain::types::{AppError, MessageRole};
use std::sync::Arc;

fn values(pairs: &[(&str, &str)]) -> ChainValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_llm_chain_formats_prompt_and_returns_trimmed_text() {
    let llm = Arc::new(ScriptedLLMClient::new(["  An autoencoder compresses.\n"]));
    let chain = LLMChain::new(
        llm.clone(),
        PromptTemplate::new("Explain the concept of {concept} in a couple of lines").unwrap(),
    );

    assert_eq!(chain.run("autoencoder").await.unwrap(), "An autoencoder compresses.");
    assert_eq!(
        llm.prompts(),
        vec!["Explain the concept of autoencoder in a couple of lines"]
    );
}

#[tokio::test]
async fn test_llm_chain_missing_input_makes_no_call() {
    let llm = Arc::new(ScriptedLLMClient::new(["unused"]));
    let chain = LLMChain::new(llm.clone(), PromptTemplate::new("{a} and {b}").unwrap());

    let err = chain.call(&values(&[("a", "1")])).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(llm.calls().is_empty());

    // Two inputs means `run` is not available.
    assert!(chain.run("x").await.is_err());
}

#[tokio::test]
async fn test_simple_sequential_feeds_each_output_forward() {
    let llm = Arc::new(ScriptedLLMClient::new([
        "Autoencoders learn compact codes.",
        "It's a machine that squishes pictures and un-squishes them.",
    ]));
    let first = LLMChain::new(
        llm.clone(),
        PromptTemplate::new("Explain the concept of {concept}").unwrap(),
    );
    let second = LLMChain::new(
        llm.clone(),
        PromptTemplate::new("Explain like I'm five: {ml_concept}").unwrap(),
    );
    let overall = SimpleSequentialChain::new(vec![Arc::new(first), Arc::new(second)]).unwrap();

    let run = overall.run_with_trace("autoencoder").await.unwrap();
    assert_eq!(
        run.output,
        "It's a machine that squishes pictures and un-squishes them."
    );
    assert_eq!(run.steps.len(), 2);
    assert_eq!(run.steps[0].input, "autoencoder");
    assert_eq!(run.steps[1].input, "Autoencoders learn compact codes.");
    assert_eq!(
        llm.prompts(),
        vec![
            "Explain the concept of autoencoder",
            "Explain like I'm five: Autoencoders learn compact codes."
        ]
    );
}

#[tokio::test]
async fn test_simple_sequential_stops_at_first_failure() {
    let llm = Arc::new(ScriptedLLMClient::new(["only one"]));
    let step = |t: &str| -> Arc<dyn Chain> {
        Arc::new(LLMChain::new(llm.clone(), PromptTemplate::new(t).unwrap()))
    };
    let overall =
        SimpleSequentialChain::new(vec![step("{a}"), step("{b}"), step("{c}")]).unwrap();

    assert!(overall.run("start").await.is_err());
    assert_eq!(llm.calls().len(), 2);
}

#[test]
fn test_simple_sequential_rejects_multi_input_steps() {
    let llm = Arc::new(MockLLMClient::new("x"));
    let multi: Arc<dyn Chain> =
        Arc::new(LLMChain::new(llm, PromptTemplate::new("{a} {b}").unwrap()));
    assert!(SimpleSequentialChain::new(vec![multi]).is_err());
    assert!(SimpleSequentialChain::new(vec![]).is_err());
}

#[tokio::test]
async fn test_sequential_chain_routes_named_values() {
    let llm = Arc::new(ScriptedLLMClient::new(["SYNOPSIS", "REVIEW"]));
    let synopsis: Arc<dyn Chain> = Arc::new(
        LLMChain::new(
            llm.clone(),
            PromptTemplate::new("Write a synopsis for {title} set in {era}").unwrap(),
        )
        .with_output_key("synopsis"),
    );
    let review: Arc<dyn Chain> = Arc::new(
        LLMChain::new(
            llm.clone(),
            PromptTemplate::new("Review this {era} play: {synopsis}").unwrap(),
        )
        .with_output_key("review"),
    );

    let overall = SequentialChain::new(
        vec![synopsis, review],
        vec!["title".into(), "era".into()],
        vec!["synopsis".into(), "review".into()],
    )
    .unwrap();

    let out = overall
        .call(&values(&[("title", "Tragedy at sunset"), ("era", "Victorian")]))
        .await
        .unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out["synopsis"], "SYNOPSIS");
    assert_eq!(out["review"], "REVIEW");
    assert_eq!(llm.prompts()[1], "Review this Victorian play: SYNOPSIS");
}

#[test]
fn test_sequential_chain_validates_wiring() {
    let llm = Arc::new(MockLLMClient::new("x"));
    let needs_missing: Arc<dyn Chain> = Arc::new(LLMChain::new(
        llm.clone(),
        PromptTemplate::new("{nowhere}").unwrap(),
    ));
    let err = SequentialChain::new(vec![needs_missing], vec!["input".into()], vec!["text".into()])
        .err()
        .unwrap();
    assert!(err.to_string().contains("nowhere"));

    let fine: Arc<dyn Chain> = Arc::new(LLMChain::new(llm, PromptTemplate::new("{input}").unwrap()));
    assert!(SequentialChain::new(vec![fine], vec!["input".into()], vec!["missing".into()]).is_err());
}

#[tokio::test]
async fn test_memory_sends_windowed_history() {
    let llm = ScriptedLLMClient::new(["Hi Sam!", "Your name is Sam."]);
    let mut memory = ConversationMemory::with_system("Be brief.").with_window(2);

    memory.respond(&llm, "Hi, I'm Sam").await.unwrap();
    let reply = memory.respond(&llm, "What's my name?").await.unwrap();
    assert_eq!(reply, "Your name is Sam.");
    assert_eq!(memory.len(), 4);

    match &llm.calls()[1] {
        RecordedCall::History(messages) => {
            // System message plus the last two turns.
            assert_eq!(messages.len(), 3);
            assert_eq!(messages[0].role, MessageRole::System);
            assert_eq!(messages[1].content, "Hi Sam!");
            assert_eq!(messages[2].content, "What's my name?");
        }
        other => panic!("unexpected call: {:?}", other),
    }

    assert!(memory.transcript().contains("Human: Hi, I'm Sam"));
    assert!(memory.transcript().contains("AI: Hi Sam!"));
}
