//! Prompt library for the agent and synthesizer
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! All prompts are parsed once when the library is built; the library is
//! read-only afterwards and can be shared between requests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const TOOL_SELECTION: &str = include_str!("../../../prompts/tool_selection.md");
    pub const DIRECT_REPLY: &str = include_str!("../../../prompts/direct_reply.md");
    pub const NARRATE_RESULT: &str = include_str!("../../../prompts/narrate_result.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Agent system prompt: role, categories, tool list, response format
    ToolSelection,
    /// Second stage when no tool result is available
    DirectReply,
    /// Second stage phrasing a tool result
    NarrateResult,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolSelection => "tool_selection",
            Self::DirectReply => "direct_reply",
            Self::NarrateResult => "narrate_result",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::ToolSelection, Self::DirectReply, Self::NarrateResult]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::ToolSelection => defaults::TOOL_SELECTION,
            Self::DirectReply => defaults::DIRECT_REPLY,
            Self::NarrateResult => defaults::NARRATE_RESULT,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
    /// One-line description of what the prompt is for
    pub purpose: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// The prompt body (system and optional user sections)
    pub content: String,
    /// Path to the override file, if one was used
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    pub fn is_override(&self) -> bool {
        self.override_path.is_some()
    }

    /// Render the system section with `{{var}}` placeholders replaced
    pub fn render_system(&self, vars: &HashMap<&str, String>) -> String {
        let section = extract_section(&self.content, "# System").unwrap_or(&self.content);
        substitute(section, vars)
    }

    /// Render the user section, if the prompt has one
    pub fn render_user(&self, vars: &HashMap<&str, String>) -> Option<String> {
        extract_section(&self.content, "# User").map(|user| substitute(user, vars))
    }
}

/// Immutable set of loaded prompts
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    prompts: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Load all prompts, honouring overrides in the default data directory
    pub fn load() -> Result<Self> {
        Self::load_from(default_prompts_dir())
    }

    /// Load all prompts with a custom override directory
    pub fn with_override_dir(path: PathBuf) -> Result<Self> {
        Self::load_from(Some(path))
    }

    /// Embedded prompts only
    pub fn embedded() -> Result<Self> {
        Self::load_from(None)
    }

    fn load_from(override_dir: Option<PathBuf>) -> Result<Self> {
        let mut prompts = HashMap::new();
        for &id in PromptId::all() {
            prompts.insert(id, load_prompt(id, override_dir.as_deref())?);
        }
        Ok(Self {
            override_dir,
            prompts,
        })
    }

    pub fn get(&self, id: PromptId) -> &Prompt {
        // load_from inserts every id, so the lookup cannot miss
        &self.prompts[&id]
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("prompts").join("overrides"))
}

fn load_prompt(id: PromptId, override_dir: Option<&Path>) -> Result<Prompt> {
    if let Some(dir) = override_dir {
        let path = dir.join(format!("{}.md", id.as_str()));
        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Failed to read prompt override {}: {}", path.display(), e))
            })?;
            let (metadata, body) = parse_prompt(&content)?;
            debug!(prompt = id.as_str(), path = %path.display(), "Using prompt override");
            return Ok(Prompt {
                metadata,
                content: body,
                override_path: Some(path),
            });
        }
    }

    let (metadata, body) = parse_prompt(id.default_content())?;
    Ok(Prompt {
        metadata,
        content: body,
        override_path: None,
    })
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    let rest = content.strip_prefix("---").ok_or_else(|| {
        Error::Config("Prompt must start with YAML frontmatter (---)".into())
    })?;

    let end = rest.find("---").ok_or_else(|| {
        Error::Config("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::Config(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Extract a `# Header` section, up to the next top-level header
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];
    let end = after_header.find("\n# ").unwrap_or(after_header.len());
    Some(after_header[..end].trim())
}

fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{}}}}}", key), value)
    })
}
