use super::*;
use std::collections::HashMap;

fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn defaults_to_openai_gpt() {
    let cfg = LlmConfig::from_vars(vars(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
    assert_eq!(cfg.provider, LlmProviderKind::OpenAi);
    assert_eq!(cfg.model, "gpt-4.1");
    assert_eq!(cfg.api_key, "sk-test");
    assert_eq!(cfg.base_url, DEFAULT_OPENAI_BASE_URL);
    assert_eq!(cfg.system_prompt, DEFAULT_SYSTEM_PROMPT);
    assert_eq!(cfg.params, GenerationParams::default());
    assert_eq!(
        cfg.timeouts,
        LlmTimeouts { request_secs: DEFAULT_LLM_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_LLM_CONNECT_TIMEOUT_SECS }
    );
}

#[test]
fn explicit_provider_wins_over_model_name() {
    let cfg = LlmConfig::from_vars(vars(&[
        ("LLM_PROVIDER", "qwen"),
        ("LLM_MODEL", "my-gpt-finetune"),
        ("QWEN_API_KEY", "q"),
    ]))
    .unwrap();
    assert_eq!(cfg.provider, LlmProviderKind::Qwen);
    assert_eq!(cfg.model, "my-gpt-finetune");
    assert_eq!(cfg.base_url, DEFAULT_QWEN_BASE_URL);
}

#[test]
fn provider_inferred_from_model() {
    let cfg = LlmConfig::from_vars(vars(&[
        ("LLM_MODEL", "claude-sonnet-4-5-20250929"),
        ("ANTHROPIC_API_KEY", "a"),
    ]))
    .unwrap();
    assert_eq!(cfg.provider, LlmProviderKind::Anthropic);
    assert_eq!(cfg.base_url, DEFAULT_ANTHROPIC_BASE_URL);
}

#[test]
fn unrecognized_model_is_fatal() {
    let err = LlmConfig::from_vars(vars(&[("LLM_MODEL", "llama-3"), ("OPENAI_API_KEY", "k")]))
        .unwrap_err()
        .to_string();
    assert!(err.contains("unrecognized model: llama-3"));
}

#[test]
fn infer_uses_or_not_truthy_literal() {
    // A name containing neither "gpt" nor "tts" must not resolve to OpenAI.
    assert_eq!(LlmProviderKind::infer_from_model("mistral-large"), None);
    assert_eq!(LlmProviderKind::infer_from_model("GPT-4o"), Some(LlmProviderKind::OpenAi));
    assert_eq!(LlmProviderKind::infer_from_model("gpt-4o-mini-tts"), Some(LlmProviderKind::OpenAi));
    assert_eq!(LlmProviderKind::infer_from_model("tts-1"), Some(LlmProviderKind::OpenAi));
    assert_eq!(LlmProviderKind::infer_from_model("qwen-max"), Some(LlmProviderKind::Qwen));
}

#[test]
fn unknown_provider_errors() {
    let err = LlmConfig::from_vars(vars(&[("LLM_PROVIDER", "bad"), ("OPENAI_API_KEY", "k")]))
        .unwrap_err()
        .to_string();
    assert!(err.contains("unknown LLM_PROVIDER"));
}

#[test]
fn missing_key_names_the_variable() {
    let err = LlmConfig::from_vars(vars(&[("LLM_API_KEY_ENV", "MY_KEY")])).unwrap_err();
    assert!(matches!(err, LlmError::MissingApiKey { ref var } if var == "MY_KEY"));
}

#[test]
fn empty_key_counts_as_missing() {
    let err = LlmConfig::from_vars(vars(&[("OPENAI_API_KEY", "")])).unwrap_err();
    assert!(matches!(err, LlmError::MissingApiKey { .. }));
}

#[test]
fn overrides_are_parsed() {
    let cfg = LlmConfig::from_vars(vars(&[
        ("LLM_API_KEY_ENV", "TEST_KEY"),
        ("TEST_KEY", "secret"),
        ("LLM_BASE_URL", "https://example.test/v1/"),
        ("LLM_SYSTEM_PROMPT", "Be brief."),
        ("LLM_TEMPERATURE", "0.2"),
        ("LLM_MAX_TOKENS", "128"),
        ("LLM_TOP_P", "0.9"),
        ("LLM_SEED", "none"),
        ("LLM_REQUEST_TIMEOUT_SECS", "42"),
        ("LLM_CONNECT_TIMEOUT_SECS", "7"),
    ]))
    .unwrap();
    assert_eq!(cfg.base_url, "https://example.test/v1");
    assert_eq!(cfg.system_prompt, "Be brief.");
    assert!((cfg.params.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(cfg.params.max_tokens, 128);
    assert!((cfg.params.top_p - 0.9).abs() < f32::EPSILON);
    assert_eq!(cfg.params.seed, None);
    assert_eq!(cfg.timeouts, LlmTimeouts { request_secs: 42, connect_secs: 7 });
}

#[test]
fn invalid_number_is_config_error() {
    let err = LlmConfig::from_vars(vars(&[("OPENAI_API_KEY", "k"), ("LLM_MAX_TOKENS", "lots")]))
        .unwrap_err()
        .to_string();
    assert!(err.contains("invalid LLM_MAX_TOKENS"));
}
