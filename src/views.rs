use handlebars::Handlebars;
use serde_json::json;

use crate::models::{Post, CONTENT_FIELD, DOWNLOAD_URL_FIELD, TITLE_FIELD};

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("template: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),
    #[error("render: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Server-rendered pages for the post list and its forms.
pub struct Views {
    engine: Handlebars<'static>,
}

impl Views {
    pub fn new() -> Result<Self, ViewError> {
        let mut engine = Handlebars::new();
        engine.set_strict_mode(false);
        Self::register_templates(&mut engine)?;
        Ok(Self { engine })
    }

    fn register_templates(engine: &mut Handlebars<'static>) -> Result<(), ViewError> {
        let templates = [
            ("layout", include_str!("../templates/layout.hbs")),
            ("index", include_str!("../templates/index.hbs")),
            ("new", include_str!("../templates/new.hbs")),
            ("edit", include_str!("../templates/edit.hbs")),
        ];
        for (name, source) in templates {
            engine.register_template_string(name, source).map_err(Box::new)?;
        }
        Ok(())
    }

    pub fn render_list(&self, posts: &[Post]) -> Result<String, ViewError> {
        let list: Vec<_> = posts
            .iter()
            .map(|p| {
                let extra: Vec<_> = p
                    .data
                    .iter()
                    .filter(|(k, _)| !matches!(k.as_str(), TITLE_FIELD | CONTENT_FIELD | DOWNLOAD_URL_FIELD))
                    .map(|(k, v)| json!({ "name": k, "value": display_value(v) }))
                    .collect();
                json!({
                    "id": p.id,
                    TITLE_FIELD: p.title(),
                    CONTENT_FIELD: p.content(),
                    DOWNLOAD_URL_FIELD: p.download_url(),
                    "extra": extra,
                })
            })
            .collect();
        Ok(self.engine.render("index", &json!({ "list": list }))?)
    }

    pub fn render_new(&self) -> Result<String, ViewError> {
        Ok(self.engine.render("new", &json!({}))?)
    }

    pub fn render_edit(&self, post: &Post) -> Result<String, ViewError> {
        let ctx = json!({
            "id": post.id,
            "post": {
                TITLE_FIELD: post.title(),
                CONTENT_FIELD: post.content(),
                DOWNLOAD_URL_FIELD: post.download_url(),
            }
        });
        Ok(self.engine.render("edit", &ctx)?)
    }
}

fn display_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
