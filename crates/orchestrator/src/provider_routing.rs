//! Pure model-id routing and context-window lookup (§6). No I/O; reading
//! environment variables and refreshing OAuth tokens is the caller's job
//! (`turn.rs` step 1), kept separate so the routing decision itself is a
//! plain, exhaustively-testable function.

use crate::engine::ProviderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    CodexResponsesApi,
    AnthropicChatCompletions,
    OpenRouter,
    OpenCodeZen,
    DefaultOpenAI,
}

/// Everything the OAuth-refresh step needs to know about the environment,
/// gathered once at turn start. Kept as a plain struct (rather than reading
/// `std::env` inline in `route`) so tests can exercise the table without
/// touching process environment.
#[derive(Debug, Clone, Default)]
pub struct ProviderEnv {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub opencode_zen_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub codex_access_token: Option<String>,
    pub codex_account_id: Option<String>,
}

impl ProviderEnv {
    pub fn from_environment() -> Self {
        ProviderEnv {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY").ok(),
            opencode_zen_api_key: std::env::var("OPENCODE_ZEN_API_KEY").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            codex_access_token: std::env::var("CODEX_ACCESS_TOKEN").ok(),
            codex_account_id: std::env::var("CODEX_ACCOUNT_ID").ok(),
        }
    }
}

/// §6 routing table, applied in order: codex → claude- (only if an
/// Anthropic key is present) → contains `/` → OpenRouter → `-free`/
/// `big-pickle` → OpenCode Zen → default OpenAI.
pub fn route_model(model_id: &str, env: &ProviderEnv) -> ProviderKind {
    if model_id.contains("codex") {
        return ProviderKind::CodexResponsesApi;
    }
    if model_id.starts_with("claude-") && env.anthropic_api_key.is_some() {
        return ProviderKind::AnthropicChatCompletions;
    }
    if model_id.contains('/') {
        return ProviderKind::OpenRouter;
    }
    if model_id.contains("-free") || model_id == "big-pickle" {
        return ProviderKind::OpenCodeZen;
    }
    ProviderKind::DefaultOpenAI
}

/// Resolves a `ProviderKind` plus the environment into the connection
/// details `process_directly` needs. Codex's OAuth bearer/refresh is
/// layered on top by `turn.rs`, since it needs the store's token cache;
/// this function only fills in the static parts of the Codex branch.
pub fn resolve_provider(kind: ProviderKind, env: &ProviderEnv, session_id: &str) -> Result<ProviderConfig, String> {
    match kind {
        ProviderKind::CodexResponsesApi => {
            let token = env
                .codex_access_token
                .clone()
                .ok_or_else(|| "CODEX_ACCESS_TOKEN not set".to_string())?;
            let mut headers = vec![
                ("originator".to_string(), "stratuscode".to_string()),
                ("User-Agent".to_string(), "stratuscode/1.0".to_string()),
                ("session_id".to_string(), session_id.to_string()),
            ];
            if let Some(account_id) = &env.codex_account_id {
                headers.push(("ChatGPT-Account-Id".to_string(), account_id.clone()));
            }
            Ok(ProviderConfig {
                base_url: "https://chatgpt.com/backend-api/codex".to_string(),
                api_key: token,
                extra_headers: headers,
            })
        }
        ProviderKind::AnthropicChatCompletions => {
            let key = env
                .anthropic_api_key
                .clone()
                .ok_or_else(|| "ANTHROPIC_API_KEY not set".to_string())?;
            Ok(ProviderConfig {
                base_url: "https://api.anthropic.com/v1".to_string(),
                api_key: key,
                extra_headers: vec![],
            })
        }
        ProviderKind::OpenRouter => {
            let key = env
                .openrouter_api_key
                .clone()
                .ok_or_else(|| "OPENROUTER_API_KEY not set".to_string())?;
            Ok(ProviderConfig {
                base_url: "https://openrouter.ai/api/v1".to_string(),
                api_key: key,
                extra_headers: vec![
                    ("HTTP-Referer".to_string(), "https://stratuscode.dev".to_string()),
                    ("X-Title".to_string(), "StratusCode".to_string()),
                ],
            })
        }
        ProviderKind::OpenCodeZen => {
            let key = env
                .opencode_zen_api_key
                .clone()
                .ok_or_else(|| "OPENCODE_ZEN_API_KEY not set".to_string())?;
            Ok(ProviderConfig {
                base_url: "https://opencode-zen.dev/v1".to_string(),
                api_key: key,
                extra_headers: vec![("x-opencode-client".to_string(), "cli".to_string())],
            })
        }
        ProviderKind::DefaultOpenAI => {
            let key = env
                .openai_api_key
                .clone()
                .ok_or_else(|| "OPENAI_API_KEY not set".to_string())?;
            let base_url = env
                .openai_base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            Ok(ProviderConfig {
                base_url,
                api_key: key,
                extra_headers: vec![],
            })
        }
    }
}

/// §6 context-window table. Unknown models default to 128,000 tokens.
pub fn context_window_for(model_id: &str) -> u32 {
    match model_id {
        "gpt-4o" | "gpt-4o-mini" => 128_000,
        "gpt-4.1" | "gpt-4.1-mini" => 1_047_576,
        "o3" | "o3-mini" | "o4-mini" => 200_000,
        "claude-sonnet-4" | "claude-opus-4" | "claude-3-7-sonnet" => 200_000,
        "claude-3-5-haiku" => 200_000,
        "big-pickle" => 128_000,
        _ => 128_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codex_wins_regardless_of_other_hints() {
        let env = ProviderEnv::default();
        assert_eq!(route_model("codex-mini-latest", &env), ProviderKind::CodexResponsesApi);
    }

    #[test]
    fn claude_requires_anthropic_key_present() {
        let mut env = ProviderEnv::default();
        assert_eq!(route_model("claude-sonnet-4", &env), ProviderKind::DefaultOpenAI);
        env.anthropic_api_key = Some("sk-ant-test".to_string());
        assert_eq!(route_model("claude-sonnet-4", &env), ProviderKind::AnthropicChatCompletions);
    }

    #[test]
    fn slash_routes_to_openrouter() {
        let env = ProviderEnv::default();
        assert_eq!(route_model("meta-llama/llama-3", &env), ProviderKind::OpenRouter);
    }

    #[test]
    fn free_suffix_and_big_pickle_route_to_opencode_zen() {
        let env = ProviderEnv::default();
        assert_eq!(route_model("qwen-free", &env), ProviderKind::OpenCodeZen);
        assert_eq!(route_model("big-pickle", &env), ProviderKind::OpenCodeZen);
    }

    #[test]
    fn unknown_model_falls_back_to_default_context_window() {
        assert_eq!(context_window_for("some-new-model-nobody-heard-of"), 128_000);
    }
}
