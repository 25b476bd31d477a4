//! File-backed client contexts and email templates.
//!
//! Layout under the context directory:
//!
//! ```text
//! <root>/clients/<client_id>.toml
//! <root>/templates/<name>.txt
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, instrument};

use outreach_shared::{
    ClientContext, ClientId, ContextStore, OutreachError, Result, Template, TemplateSource,
};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_]+)\s*\}\}").expect("valid regex"));

/// Identifiers become file names; keep them to one path segment.
fn check_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(OutreachError::validation(format!("invalid {kind} name: {name:?}")))
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(OutreachError::io(path, e)),
    }
}

// ---------------------------------------------------------------------------
// Client contexts
// ---------------------------------------------------------------------------

/// [`ContextStore`] reading one TOML file per client.
#[derive(Debug, Clone)]
pub struct FileContextStore {
    root: PathBuf,
}

impl FileContextStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, client_id: &ClientId) -> PathBuf {
        self.root.join("clients").join(format!("{client_id}.toml"))
    }
}

#[async_trait]
impl ContextStore for FileContextStore {
    #[instrument(skip(self), fields(client = %client_id))]
    async fn load_context(&self, client_id: &ClientId) -> Result<ClientContext> {
        check_name("client", client_id.as_str())?;
        let path = self.path_for(client_id);
        let content = read_optional(&path)
            .await?
            .ok_or_else(|| OutreachError::ContextNotFound {
                client_id: client_id.to_string(),
            })?;

        let context: ClientContext = toml::from_str(&content).map_err(|e| {
            OutreachError::validation(format!("failed to parse {}: {e}", path.display()))
        })?;
        if context.client_id != *client_id {
            return Err(OutreachError::validation(format!(
                "{} declares client_id '{}'",
                path.display(),
                context.client_id
            )));
        }
        if context.company_name.trim().is_empty() || context.sender_name.trim().is_empty() {
            return Err(OutreachError::validation(format!(
                "{}: company_name and sender_name are required",
                path.display()
            )));
        }

        debug!(?path, "client context loaded");
        Ok(context)
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// [`TemplateSource`] reading one text file per template.
#[derive(Debug, Clone)]
pub struct FileTemplateSource {
    root: PathBuf,
}

impl FileTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Placeholder names in order of first appearance.
pub fn scan_placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in PLACEHOLDER.captures_iter(text) {
        let name = cap[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[async_trait]
impl TemplateSource for FileTemplateSource {
    #[instrument(skip(self))]
    async fn get_template(&self, name: &str) -> Result<Template> {
        check_name("template", name)?;
        let path = self.root.join("templates").join(format!("{name}.txt"));
        let text = read_optional(&path)
            .await?
            .ok_or_else(|| OutreachError::TemplateNotFound { name: name.into() })?;

        let text = text.trim_end().to_string();
        Ok(Template {
            name: name.to_string(),
            placeholders: scan_placeholders(&text),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn fixtures() -> PathBuf {
        PathBuf::from("../../../fixtures")
    }

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("outreach-context-{}", Uuid::now_v7()));
        std::fs::create_dir_all(dir.join("clients")).unwrap();
        dir
    }

    #[tokio::test]
    async fn loads_fixture_client() {
        let store = FileContextStore::new(fixtures());
        let ctx = store.load_context(&ClientId::new("acme")).await.unwrap();
        assert_eq!(ctx.company_name, "Acme Analytics");
        assert_eq!(ctx.language, "en");
        assert_eq!(ctx.case_studies.len(), 1);
        assert!(ctx.excludes_competitor("Partner Corp"));
    }

    #[tokio::test]
    async fn unknown_client_is_context_not_found() {
        let store = FileContextStore::new(fixtures());
        let err = store.load_context(&ClientId::new("nobody")).await.unwrap_err();
        assert!(matches!(err, OutreachError::ContextNotFound { .. }));
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let store = FileContextStore::new(fixtures());
        let err = store
            .load_context(&ClientId::new("../clients/acme"))
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::Validation { .. }));
    }

    #[tokio::test]
    async fn mismatched_client_id_is_rejected() {
        let root = temp_root();
        let body = std::fs::read_to_string(fixtures().join("clients/acme.toml")).unwrap();
        std::fs::write(root.join("clients/other.toml"), body).unwrap();

        let store = FileContextStore::new(&root);
        let err = store.load_context(&ClientId::new("other")).await.unwrap_err();
        assert!(err.to_string().contains("declares client_id 'acme'"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn minimal_client_gets_defaults() {
        let root = temp_root();
        std::fs::write(
            root.join("clients/mini.toml"),
            r#"
client_id = "mini"
company_name = "Mini Co"
sender_name = "Sam"
value_proposition = "small things"
domain = "procurement"
"#,
        )
        .unwrap();

        let ctx = FileContextStore::new(&root)
            .load_context(&ClientId::new("mini"))
            .await
            .unwrap();
        assert_eq!(ctx.default_template, "intro");
        assert!(ctx.target_roles.is_empty());
        assert!(ctx.website.is_none());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn loads_fixture_template_with_placeholders() {
        let source = FileTemplateSource::new(fixtures());
        let template = source.get_template("intro").await.unwrap();
        assert_eq!(template.placeholders.first().map(String::as_str), Some("recipient_name"));
        assert!(template.placeholders.contains(&"proof_point".to_string()));
        assert!(!template.text.ends_with('\n'));

        let err = source.get_template("missing").await.unwrap_err();
        assert!(matches!(err, OutreachError::TemplateNotFound { .. }));
    }

    #[test]
    fn scan_dedups_in_order() {
        assert_eq!(
            scan_placeholders("{{company}} {{ role }} {{company}} {{role"),
            vec!["company".to_string(), "role".to_string()]
        );
    }
}
