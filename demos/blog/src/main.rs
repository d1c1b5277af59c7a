//! Blog Example
//!
//! A single HMVC module served as a CGI program.
//!
//! # Routes
//!
//! ```text
//! GET     /articles                Article@index
//! GET     /articles/create         Article@create
//! POST    /articles                Article@store
//! GET     /articles/{id}           Article@show
//! GET     /articles/{id}/edit      Article@edit
//! PUT     /articles/{id}           Article@update
//! DELETE  /articles/{id}           Article@destroy
//! GET     /api/articles            (inline, requires X-Api-Key)
//! ```
//!
//! HTML forms reach `update` and `destroy` through a `_method` field.
//!
//! # Configuration
//!
//! ```toml
//! [app]
//! base_path = "/cgi-bin/blog"
//!
//! [modules.settings.Blog]
//! title = "Field Notes"
//! ```
//!
//! # Usage
//!
//! ```bash
//! REQUEST_METHOD=GET REQUEST_URI=/articles/1 cargo run --package keel-blog
//! ```

use std::sync::Arc;

use keel::prelude::*;
use keel::runtime::RuntimeResult;
use linkme::distributed_slice;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ─── Store ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
struct Article {
    id: u64,
    title: String,
    body: String,
}

/// In-memory article storage, shared through the service container.
#[derive(Debug, Default)]
struct ArticleStore {
    articles: RwLock<Vec<Article>>,
}

impl ArticleStore {
    fn seeded() -> Self {
        let store = Self::default();
        store.insert("Hello, Keel", "The first article.");
        store.insert("Routing", "Patterns, groups and resources.");
        store
    }

    fn all(&self) -> Vec<Article> {
        self.articles.read().clone()
    }

    fn find(&self, id: u64) -> Option<Article> {
        self.articles.read().iter().find(|a| a.id == id).cloned()
    }

    fn insert(&self, title: &str, body: &str) -> Article {
        let mut articles = self.articles.write();
        let id = articles.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        let article = Article {
            id,
            title: title.to_string(),
            body: body.to_string(),
        };
        articles.push(article.clone());
        article
    }

    fn update(&self, id: u64, title: &str, body: &str) -> bool {
        let mut articles = self.articles.write();
        match articles.iter_mut().find(|a| a.id == id) {
            Some(article) => {
                article.title = title.to_string();
                article.body = body.to_string();
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut articles = self.articles.write();
        let before = articles.len();
        articles.retain(|a| a.id != id);
        articles.len() != before
    }
}

#[derive(Debug, Deserialize)]
struct BlogSettings {
    #[serde(default = "default_title")]
    title: String,
}

impl Default for BlogSettings {
    fn default() -> Self {
        Self {
            title: default_title(),
        }
    }
}

fn default_title() -> String {
    "Keel Blog".to_string()
}

// ─── Controller ───────────────────────────────────────────────────────────────

struct ArticleController {
    store: Arc<ArticleStore>,
    settings: BlogSettings,
}

impl ArticleController {
    fn page(&self, heading: &str, content: &str) -> Response {
        Response::html(format!(
            "<html><head><title>{title}</title></head><body><h1>{heading}</h1>{content}</body></html>",
            title = self.settings.title
        ))
    }

    fn id(params: &Params) -> Option<u64> {
        params.get("id").and_then(|id| id.parse().ok())
    }

    fn index(&mut self, _req: &mut Request, _params: &Params) -> HandlerResult {
        let items: String = self
            .store
            .all()
            .iter()
            .map(|a| format!("<li><a href=\"/articles/{}\">{}</a></li>", a.id, a.title))
            .collect();
        Ok(self
            .page(&self.settings.title, &format!("<ul>{items}</ul>"))
            .into())
    }

    fn create(&mut self, _req: &mut Request, _params: &Params) -> HandlerResult {
        Ok(self
            .page(
                "New article",
                "<form method=\"post\" action=\"/articles\">\
                 <input name=\"title\"><textarea name=\"body\"></textarea>\
                 <button>Save</button></form>",
            )
            .into())
    }

    fn store(&mut self, req: &mut Request, _params: &Params) -> HandlerResult {
        let title = req.input("title").unwrap_or_default();
        if title.trim().is_empty() {
            return Ok(Response::text("title is required").with_status(422).into());
        }
        let article = self
            .store
            .insert(title, req.input("body").unwrap_or_default());
        info!(id = article.id, "Article created");
        Ok(Response::redirect(format!("/articles/{}", article.id)).into())
    }

    fn show(&mut self, _req: &mut Request, params: &Params) -> HandlerResult {
        match Self::id(params).and_then(|id| self.store.find(id)) {
            Some(article) => Ok(self
                .page(&article.title, &format!("<p>{}</p>", article.body))
                .into()),
            None => Ok(Response::not_found().into()),
        }
    }

    fn edit(&mut self, _req: &mut Request, params: &Params) -> HandlerResult {
        let Some(article) = Self::id(params).and_then(|id| self.store.find(id)) else {
            return Ok(Response::not_found().into());
        };
        let form = format!(
            "<form method=\"post\" action=\"/articles/{id}\">\
             <input type=\"hidden\" name=\"_method\" value=\"PUT\">\
             <input name=\"title\" value=\"{title}\"><textarea name=\"body\">{body}</textarea>\
             <button>Update</button></form>",
            id = article.id,
            title = article.title,
            body = article.body
        );
        Ok(self.page("Edit article", &form).into())
    }

    fn update(&mut self, req: &mut Request, params: &Params) -> HandlerResult {
        let Some(id) = Self::id(params) else {
            return Ok(Response::not_found().into());
        };
        let title = req.input("title").unwrap_or_default();
        let body = req.input("body").unwrap_or_default();
        if !self.store.update(id, title, body) {
            return Ok(Response::not_found().into());
        }
        Ok(Response::redirect(format!("/articles/{id}")).into())
    }

    fn destroy(&mut self, _req: &mut Request, params: &Params) -> HandlerResult {
        match Self::id(params) {
            Some(id) if self.store.remove(id) => Ok(Response::redirect("/articles").into()),
            _ => Ok(Response::not_found().into()),
        }
    }
}

impl Controller for ArticleController {
    fn new(ctx: Arc<AppContext>) -> Self {
        let store = match ctx.container().make::<ArticleStore>("blog.articles") {
            Ok(store) => store,
            Err(_) => Arc::new(ArticleStore::default()),
        };
        let settings = ctx.module_config::<Option<BlogSettings>>("Blog").ok().flatten();
        Self {
            store,
            settings: settings.unwrap_or_default(),
        }
    }

    fn actions(actions: &mut Actions<Self>) {
        actions
            .add("index", Self::index)
            .add("create", Self::create)
            .add("store", Self::store)
            .add("show", Self::show)
            .add("edit", Self::edit)
            .add("update", Self::update)
            .add("destroy", Self::destroy);
    }
}

// ─── Module ───────────────────────────────────────────────────────────────────

fn controllers(registry: &mut ControllerRegistry) {
    registry.register::<ArticleController>("Blog", "Article");
}

fn services(container: &Container) {
    container.singleton("blog.articles", |_| Ok(ArticleStore::seeded()));
}

fn middleware(registry: &mut MiddlewareRegistry) {
    registry.register(
        "api_key",
        RequireHeader::new("X-Api-Key", Response::text("Unauthorized").with_status(401)),
    );
}

fn routes(router: &mut Router) -> RouteResult<()> {
    router.resource("articles", "Article", "Blog", ())?;

    router.group("/api", "api_key", "Blog", |api| {
        api.get(
            "/articles",
            handler(|ctx, _req, _params| {
                let store = ctx.container().make::<ArticleStore>("blog.articles")?;
                Ok(Response::json(&store.all())?.into())
            }),
            "Blog",
            (),
        )?;
        Ok(())
    })?;

    Ok(())
}

#[distributed_slice(MODULES)]
static BLOG: ModuleDescriptor = ModuleDescriptor::new("Blog")
    .with_controllers(controllers)
    .with_services(services)
    .with_middleware(middleware)
    .with_routes(routes);

// ============================================================================
// Main
// ============================================================================

fn main() -> RuntimeResult<()> {
    let app = Application::builder()
        .global_middleware("request_logger")
        .middleware("request_logger", RequestLogger)
        .build()?;

    debug!(routes = %app.route_list(), "Route table");
    app.serve_cgi()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn app() -> Application {
        Application::builder()
            .config(KeelConfig::default())
            .without_logging()
            .build()
            .unwrap()
    }

    fn cgi(app: &Application, vars: &[(&str, &str)], body: &str) -> String {
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string()));
        let mut out = Vec::new();
        app.serve_cgi_from(vars, body.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_show_seeded_article() {
        let out = cgi(
            &app(),
            &[("REQUEST_METHOD", "GET"), ("REQUEST_URI", "/articles/1")],
            "",
        );
        assert!(out.starts_with("Status: 200 OK\r\n"));
        assert!(out.contains("<h1>Hello, Keel</h1>"));
    }

    #[test]
    fn test_form_store_then_override_delete() {
        let app = app();
        let out = cgi(
            &app,
            &[
                ("REQUEST_METHOD", "POST"),
                ("REQUEST_URI", "/articles"),
                ("CONTENT_TYPE", "application/x-www-form-urlencoded"),
            ],
            "title=Third&body=More",
        );
        assert!(out.starts_with("Status: 302 Found\r\n"));
        assert!(out.contains("Location: /articles/3\r\n"));

        let out = cgi(
            &app,
            &[
                ("REQUEST_METHOD", "POST"),
                ("REQUEST_URI", "/articles/3"),
                ("CONTENT_TYPE", "application/x-www-form-urlencoded"),
            ],
            "_method=DELETE",
        );
        assert!(out.contains("Location: /articles\r\n"));

        let res = app.handle(Request::new(Method::Get, "/articles/3"));
        assert_eq!(res.status(), 404);
    }

    #[test]
    fn test_api_requires_key() {
        let app = app();
        assert_eq!(app.handle(Request::new(Method::Get, "/api/articles")).status(), 401);

        let req = Request::builder(Method::Get, "/api/articles")
            .header("X-Api-Key", "secret")
            .build();
        let res = app.handle(req);
        assert_eq!(res.status(), 200);
        assert!(res.body_text().contains("\"title\":\"Routing\""));
    }
}
