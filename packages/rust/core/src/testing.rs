//! In-memory collaborators and fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use outreach_shared::{
    CaseStudy, ClientContext, ClientId, Completion, CompletionProvider, Contact, ContentFetcher,
    ContextStore, OutreachError, PageContent, Prompt, ProviderConfig, ProviderError, Result,
    SearchHit, SearchProvider, StageKind, StageOutputs, StageResult, Template, TemplateSource,
};

type Route = Box<dyn Fn(&Prompt) -> std::result::Result<String, ProviderError> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<String>>),
    Failing(ProviderError),
    Routed(Route),
}

/// Completion provider replaying canned answers; `NONE` once the queue is empty.
pub struct ScriptedCompletion {
    script: Script,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::Queue(Mutex::new(
            answers.into_iter().map(Into::into).collect(),
        )))
    }

    pub fn failing(err: ProviderError) -> Self {
        Self::with_script(Script::Failing(err))
    }

    /// Answer each prompt with a closure.
    pub fn routed(
        route: impl Fn(&Prompt) -> std::result::Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_script(Script::Routed(Box::new(route)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("lock").len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &Prompt,
        config: &ProviderConfig,
    ) -> std::result::Result<Completion, ProviderError> {
        self.prompts.lock().expect("lock").push(prompt.clone());
        let text = match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| "NONE".into()),
            Script::Failing(err) => return Err(err.clone()),
            Script::Routed(route) => route(prompt)?,
        };
        Ok(Completion {
            text,
            model: config.model.clone(),
            tokens_in: 10,
            tokens_out: 5,
            latency_ms: 1,
        })
    }
}

/// Search provider returning the same hits for every query.
pub struct FakeSearch {
    answer: std::result::Result<Vec<SearchHit>, ProviderError>,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            answer: Ok(hits),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            answer: Err(err),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().expect("lock").len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("lock").clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchHit>, ProviderError> {
        self.queries.lock().expect("lock").push(query.to_string());
        self.answer.clone()
    }
}

/// Fetcher serving pages by URL path.
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn empty() -> Self {
        Self {
            pages: HashMap::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(path: &str, text: &str) -> Self {
        let mut fetcher = Self::empty();
        fetcher.pages.insert(path.to_string(), text.to_string());
        fetcher
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().expect("lock").len()
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<PageContent, ProviderError> {
        self.requested.lock().expect("lock").push(url.to_string());
        match self.pages.get(url.path()) {
            Some(text) => Ok(PageContent {
                url: url.clone(),
                title: None,
                text: text.clone(),
            }),
            None => Err(ProviderError::NotFound(url.to_string())),
        }
    }
}

/// Context store holding a fixed set of clients.
pub struct MemoryContexts(HashMap<ClientId, ClientContext>);

impl MemoryContexts {
    pub fn with(context: ClientContext) -> Self {
        Self(HashMap::from([(context.client_id.clone(), context)]))
    }
}

#[async_trait]
impl ContextStore for MemoryContexts {
    async fn load_context(&self, client_id: &ClientId) -> Result<ClientContext> {
        self.0
            .get(client_id)
            .cloned()
            .ok_or_else(|| OutreachError::ContextNotFound {
                client_id: client_id.to_string(),
            })
    }
}

/// Template source holding a fixed set of templates.
pub struct MemoryTemplates(HashMap<String, Template>);

impl MemoryTemplates {
    pub fn with(template: Template) -> Self {
        Self(HashMap::from([(template.name.clone(), template)]))
    }
}

#[async_trait]
impl TemplateSource for MemoryTemplates {
    async fn get_template(&self, name: &str) -> Result<Template> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| OutreachError::TemplateNotFound { name: name.into() })
    }
}

pub fn acme_context() -> ClientContext {
    ClientContext {
        client_id: ClientId::new("acme"),
        company_name: "Acme Analytics".into(),
        sender_name: "Jane Doe".into(),
        website: None,
        value_proposition: "automated operations reporting for mid-size firms".into(),
        domain: "operations reporting".into(),
        language: "en".into(),
        target_industries: vec!["logistics".into(), "manufacturing".into()],
        target_roles: vec!["Head of Operations".into(), "COO".into()],
        pain_themes: vec!["manual reporting".into(), "fragmented data".into()],
        tool_categories: vec!["CRM".into(), "ERP".into(), "BI".into()],
        competitor_exclusions: vec!["Partner Corp".into()],
        case_studies: vec![CaseStudy {
            customer: "Fabrikam".into(),
            industry: "logistics".into(),
            outcome: "cut month-end reporting time by 40%".into(),
            url: None,
        }],
        default_template: "intro".into(),
    }
}

pub fn contact(website: Option<&str>) -> Contact {
    Contact {
        company: "Northwind Logistics".into(),
        website: website.map(|w| Url::parse(w).expect("valid url")),
        industry: "logistics".into(),
        recipient_name: None,
    }
}

pub fn provider_config() -> ProviderConfig {
    ProviderConfig {
        model: "test/model".into(),
        temperature: 0.3,
        max_tokens: 256,
        input_cost_per_mtok: 1.0,
        output_cost_per_mtok: 2.0,
    }
}

/// Every placeholder once.
pub fn intro_template() -> Template {
    Template {
        name: "intro".into(),
        text: "Hi {{recipient_name}},\n\n\
               As {{role}} at {{company}}, you are probably watching {{competitor}} closely. \
               Many teams we talk to struggle with {{pain_point}}, and I noticed {{signal}}.\n\n\
               Since you rely on {{tooling}}, it may help that we {{proof_point}}.\n\n\
               Best,\n{{sender_name}}, {{sender_company}}"
            .into(),
        placeholders: Vec::new(),
    }
}

/// Stage outputs with `custom` results; other slots get neutral generic values.
pub fn outputs_with(mut custom: HashMap<StageKind, StageResult>) -> StageOutputs {
    let results = StageKind::ALL
        .into_iter()
        .map(|kind| {
            let result = custom.remove(&kind).unwrap_or_else(|| {
                StageResult::generic(kind, format!("generic {}", kind.as_str().replace('_', " ")))
            });
            (kind, result)
        })
        .collect::<HashMap<_, _>>();
    StageOutputs::from_map(results).expect("all six slots")
}
