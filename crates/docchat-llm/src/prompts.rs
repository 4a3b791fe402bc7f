use anyhow::Result;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use docchat_core::config::{expand_path, PromptSettings};

/// Placeholder in `rag_system_prompt` replaced by the retrieved context.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompts {
    pub rag_system_prompt: String,
    pub query_rewrite_prompt: String,
    pub query_transform_examples: Vec<FewShotExample>,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            rag_system_prompt: "You are a study assistant answering questions about the user's course documents.\n\
                Answer using only the context below. If the context does not contain the answer, say that the \
                information is not included in the documents. Be concise and use Markdown where it helps.\n\n\
                Context:\n{context}"
                .to_string(),
            query_rewrite_prompt: "Given the conversation so far and a follow-up question, rewrite the follow-up \
                into a single standalone search query that can be understood without the conversation. \
                Resolve pronouns and references. Reply with the query only, without quotes or explanation. \
                If the follow-up is already standalone, repeat it unchanged."
                .to_string(),
            query_transform_examples: vec![
                FewShotExample {
                    input: "What about its time complexity?".to_string(),
                    output: "What is the time complexity of binary search?".to_string(),
                },
                FewShotExample {
                    input: "Can you give an example of one?".to_string(),
                    output: "Give an example of a deadlock in operating systems.".to_string(),
                },
                FewShotExample {
                    input: "How does it differ from the second one?".to_string(),
                    output: "How does TCP differ from UDP?".to_string(),
                },
            ],
        }
    }
}

impl Prompts {
    /// Built-in prompts, overridden field by field from the TOML file in
    /// `settings.path` when one is configured.
    pub fn load(settings: &PromptSettings) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Prompts::default()));
        if let Some(path) = &settings.path {
            let path = expand_path(path);
            if !path.is_file() {
                return Err(docchat_core::Error::NotFound(format!("prompts file {}", path.display())).into());
            }
            figment = figment.merge(Toml::file(path));
        }
        Ok(figment.extract()?)
    }

    pub fn system_with_context(&self, context: &str) -> String {
        self.rag_system_prompt.replace(CONTEXT_PLACEHOLDER, context)
    }
}
