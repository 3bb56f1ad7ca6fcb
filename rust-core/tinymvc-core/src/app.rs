//! # Application
//!
//! The shared, immutable-after-startup half of the framework: config,
//! database pool, views, session store and the dispatcher. One `App` is
//! built at startup and shared by every request behind an `Arc`.
//!
//! ## Request pipeline
//!
//! 1. Load or start the session named by the `session.name` cookie
//! 2. Dispatch to the matched controller action
//! 3. Turn errors into responses (`ValidationFailed` redirects back,
//!    everything else renders the error view for its status)
//! 4. Move the response's flashes onto the session
//! 5. Remember successful GETs as the page to go back to
//! 6. Keep the session if it holds data, setting the cookie for new ones,
//!    and echo `x-request-id`

use crate::config::Config;
use crate::context::Context;
use crate::csrf::Csrf;
use crate::database::DatabasePool;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::route::Method;
use crate::server::generate_request_id;
use crate::session::{Session, SessionStore};
use crate::view::Views;
use hyper::body::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Header carrying the per-request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application shared by all requests
#[derive(Debug)]
pub struct App {
    config: Config,
    db: Option<DatabasePool>,
    views: Views,
    sessions: SessionStore,
    dispatcher: Dispatcher,
    csrf: Csrf,
}

impl App {
    /// Application without a database
    #[must_use]
    pub fn new(config: Config, dispatcher: Dispatcher) -> Self {
        Self {
            views: Views::new(config.views.path.clone()),
            csrf: Csrf::new(config.session.csrf_token.clone()),
            sessions: SessionStore::with_idle_timeout(config.session.idle_timeout()),
            config,
            db: None,
            dispatcher,
        }
    }

    /// Attach a database pool
    #[must_use]
    pub fn with_database(mut self, db: DatabasePool) -> Self {
        self.db = Some(db);
        self
    }

    /// Build from configuration, opening a lazy pool when
    /// `database.url` is set
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionFailed` for a malformed database URL.
    ///
    /// # Panics
    ///
    /// With `database.url` set this must run inside a Tokio runtime, see
    /// [`DatabasePool::connect_lazy`].
    pub fn from_config(config: Config, dispatcher: Dispatcher) -> Result<Self> {
        let db = match config.database.url.as_deref() {
            Some(url) => Some(DatabasePool::connect_lazy(
                url,
                config.database.max_connections,
            )?),
            None => None,
        };

        let mut app = Self::new(config, dispatcher);
        app.db = db;
        Ok(app)
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Database pool, if configured
    #[must_use]
    pub fn database(&self) -> Option<&DatabasePool> {
        self.db.as_ref()
    }

    /// View loader
    #[must_use]
    pub fn views(&self) -> &Views {
        &self.views
    }

    /// CSRF issuer
    #[must_use]
    pub fn csrf(&self) -> &Csrf {
        &self.csrf
    }

    /// Live sessions
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Routes and actions
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run a request through the full pipeline without the network stack
    ///
    /// Bodies larger than `server.max_body_size` get a 413 and multipart
    /// bodies are decoded, like they would be over HTTP.
    pub async fn handle(
        self: &Arc<Self>,
        method: Method,
        uri: &str,
        headers: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Response {
        let limit = self.config.server.max_body_size;
        if let Some(actual) = body.as_ref().map(Bytes::len).filter(|len| *len > limit) {
            let e = Error::PayloadTooLarge { limit, actual };
            return self.error_response(&e, None);
        }

        let mut request = Request::new(method, uri, headers, body);
        if let Err(e) = request.read_multipart().await {
            return self.error_response(&e, None);
        }
        self.respond(request).await
    }

    /// Serve an already parsed request
    pub(crate) async fn respond(self: &Arc<Self>, mut request: Request) -> Response {
        let request_id = request
            .header(REQUEST_ID_HEADER)
            .map_or_else(generate_request_id, String::from);
        request.set_header(REQUEST_ID_HEADER, &request_id);

        let cookie_name = self.config.session.name.as_str();
        let (session_id, session, created) = self.sessions.load_or_create(request.cookie(cookie_name));

        let method = request.method;
        let uri = request.uri().into_owned();
        let ctx = Context::new(request, session.clone(), Arc::clone(self));

        let mut response = match self.dispatcher.dispatch(ctx).await {
            Ok(response) => response,
            Err(e) => self.error_response(&e, Some(&session)),
        };

        for (key, value) in response.take_flashes() {
            session.flash(key, value);
        }
        if method == Method::Get && (200..300).contains(&response.status) {
            session.set_previous_url(uri);
        }
        if self.sessions.persist(&session_id, &session) && created {
            response.set_header(
                "Set-Cookie",
                &format!("{cookie_name}={session_id}; Path=/; HttpOnly; SameSite=Lax"),
            );
        }
        response.set_header(REQUEST_ID_HEADER, &request_id);
        response
    }

    /// Response for a failed request
    pub(crate) fn error_response(&self, e: &Error, session: Option<&Session>) -> Response {
        if let Error::ValidationFailed(bag) = e {
            let back = session
                .and_then(Session::previous_url)
                .unwrap_or_else(|| "/".to_string());
            debug!(fields = bag.len(), location = %back, "Redirecting back after validation");
            return Response::redirect(&back);
        }

        let status = e.status_code();
        if status >= 500 {
            error!(status, error = %e, "Request failed");
        } else {
            warn!(status, error = %e, "Request rejected");
        }
        self.views.render_error(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{handler, Controllers, RouteParams};
    use crate::router::RouteTable;
    use serde_json::json;

    async fn home(ctx: Context, _params: RouteParams) -> Result<Response> {
        let visits = ctx.session().get_as::<i64>("visits").unwrap_or(0) + 1;
        ctx.session().set("visits", visits);
        Ok(Response::text(format!("visits={visits}")))
    }

    async fn contact(ctx: Context, _params: RouteParams) -> Result<Response> {
        ctx.validate(&[("email", "required|email"), ("message", "required|min:5")])
            .await?;
        Ok(Response::redirect("/").with("success", "Message sent!"))
    }

    async fn form(ctx: Context, _params: RouteParams) -> Result<Response> {
        Ok(Response::html(ctx.csrf().generate(ctx.session())))
    }

    async fn submit(ctx: Context, _params: RouteParams) -> Result<Response> {
        ctx.verify_csrf()?;
        Ok(Response::text("accepted"))
    }

    async fn flash(ctx: Context, _params: RouteParams) -> Result<Response> {
        let message = ctx.session().take("success").unwrap_or(json!(null));
        Ok(Response::json(&message)?)
    }

    async fn upload(ctx: Context, _params: RouteParams) -> Result<Response> {
        ctx.validate(&[("title", "required"), ("photo", "required|image|mime:png")])
            .await?;
        let summary = ctx
            .request()
            .file("photo")
            .map(|f| format!("{} {} {}", ctx.input("title").unwrap_or_default(), f.filename, f.size()))
            .unwrap_or_default();
        Ok(Response::text(summary))
    }

    async fn broken(_ctx: Context, _params: RouteParams) -> Result<Response> {
        Err(Error::QueryExecutionFailed {
            message: "no such table: users".to_string(),
        })
    }

    fn app(views: &std::path::Path) -> Arc<App> {
        let mut routes = RouteTable::new();
        routes.add("GET", "/", "Home@index").unwrap();
        routes.add("POST", "/contact", "Home@contact").unwrap();
        routes.add("GET", "/form", "Home@form").unwrap();
        routes.add("POST", "/form", "Home@submit").unwrap();
        routes.add("GET", "/flash", "Home@flash").unwrap();
        routes.add("GET", "/broken", "Home@broken").unwrap();
        routes.add("POST", "/photos", "Home@upload").unwrap();

        let mut controllers = Controllers::new();
        controllers.register("Home@index", handler(home)).unwrap();
        controllers.register("Home@contact", handler(contact)).unwrap();
        controllers.register("Home@form", handler(form)).unwrap();
        controllers.register("Home@submit", handler(submit)).unwrap();
        controllers.register("Home@flash", handler(flash)).unwrap();
        controllers.register("Home@broken", handler(broken)).unwrap();
        controllers.register("Home@upload", handler(upload)).unwrap();

        let mut config = Config::from_toml_str("[server]\nmax_body_size = 1024").unwrap();
        config.views.path = views.to_path_buf();
        let dispatcher = Dispatcher::new(routes, controllers).unwrap();
        Arc::new(App::new(config, dispatcher))
    }

    fn session_cookie(res: &Response) -> String {
        let header = res.header("Set-Cookie").unwrap();
        header.split(';').next().unwrap().to_string()
    }

    fn with_cookie(cookie: &str) -> HashMap<String, String> {
        HashMap::from([("Cookie".to_string(), cookie.to_string())])
    }

    fn form_headers(cookie: &str) -> HashMap<String, String> {
        let mut headers = with_cookie(cookie);
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers
    }

    #[tokio::test]
    async fn test_session_cookie_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let first = app.handle(Method::Get, "/", HashMap::new(), None).await;
        assert_eq!(first.body, "visits=1");
        assert!(first.header(REQUEST_ID_HEADER).is_some());
        let cookie = session_cookie(&first);
        assert!(cookie.starts_with("tinymvc_session="));

        let second = app.handle(Method::Get, "/", with_cookie(&cookie), None).await;
        assert_eq!(second.body, "visits=2");
        assert!(second.header("Set-Cookie").is_none());
        assert_eq!(app.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_renders_error_view() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("errors")).unwrap();
        std::fs::write(dir.path().join("errors/404.html"), "<h1>Lost: {{ status }}</h1>").unwrap();
        let app = app(dir.path());

        let res = app.handle(Method::Get, "/nowhere", HashMap::new(), None).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body, "<h1>Lost: 404</h1>");

        let res = app.handle(Method::Get, "/broken", HashMap::new(), None).await;
        assert_eq!(res.status, 500);
        assert_eq!(res.body, "500 Internal Server Error");
    }

    #[tokio::test]
    async fn test_cookieless_misses_leave_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        for _ in 0..1000 {
            let res = app.handle(Method::Get, "/nowhere", HashMap::new(), None).await;
            assert_eq!(res.status, 404);
            assert!(res.header("Set-Cookie").is_none());
        }
        assert!(app.sessions().is_empty());

        let res = app.handle(Method::Get, "/", HashMap::new(), None).await;
        assert!(res.header("Set-Cookie").is_some());
        assert_eq!(app.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let headers = HashMap::from([(REQUEST_ID_HEADER.to_string(), "abc-123".to_string())]);
        let res = app.handle(Method::Get, "/", headers, None).await;
        assert_eq!(res.header(REQUEST_ID_HEADER), Some("abc-123"));
    }

    #[tokio::test]
    async fn test_validation_failure_redirects_back() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let cookie = session_cookie(&app.handle(Method::Get, "/form", HashMap::new(), None).await);
        let res = app
            .handle(
                Method::Post,
                "/contact",
                form_headers(&cookie),
                Some(Bytes::from("email=nope&message=hi")),
            )
            .await;

        assert_eq!(res.status, 302);
        assert_eq!(res.header("Location"), Some("/form"));

        let id = cookie.split('=').nth(1).unwrap();
        let (_, session, _) = app.sessions().load_or_create(Some(id));
        let bag = crate::validation::MessageBag::from_session(&session);
        assert_eq!(bag.first("email"), Some("Email should be a valid email!"));
        assert!(bag.has("message"));
        assert_eq!(session.old_input("email").as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn test_flash_survives_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let cookie = session_cookie(&app.handle(Method::Get, "/", HashMap::new(), None).await);
        let res = app
            .handle(
                Method::Post,
                "/contact",
                form_headers(&cookie),
                Some(Bytes::from("email=a%40b.com&message=hello+there")),
            )
            .await;
        assert_eq!(res.status, 302);
        assert_eq!(res.header("Location"), Some("/"));

        let res = app.handle(Method::Get, "/flash", with_cookie(&cookie), None).await;
        assert_eq!(res.body, "\"Message sent!\"");
        let res = app.handle(Method::Get, "/flash", with_cookie(&cookie), None).await;
        assert_eq!(res.body, "null");
    }

    #[tokio::test]
    async fn test_csrf_token_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let page = app.handle(Method::Get, "/form", HashMap::new(), None).await;
        let cookie = session_cookie(&page);
        let body = Bytes::from(format!("csrf_token={}", page.body));

        let ok = app
            .handle(Method::Post, "/form", form_headers(&cookie), Some(body.clone()))
            .await;
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body, "accepted");

        let replay = app
            .handle(Method::Post, "/form", form_headers(&cookie), Some(body))
            .await;
        assert_eq!(replay.status, 403);
    }

    fn upload_request(filename: &str, data: &[u8]) -> (HashMap<String, String>, Bytes) {
        let mut body = format!(
            "--b0undary\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             Sunset\r\n\
             --b0undary\r\n\
             Content-Disposition: form-data; name=\"photo\"; filename=\"{filename}\"\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n--b0undary--\r\n");
        let headers = HashMap::from([(
            "Content-Type".to_string(),
            "multipart/form-data; boundary=b0undary".to_string(),
        )]);
        (headers, Bytes::from(body))
    }

    #[tokio::test]
    async fn test_multipart_upload_passes_image_rule() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let png = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01";
        let (headers, body) = upload_request("sunset.png", png);
        let res = app.handle(Method::Post, "/photos", headers, Some(body)).await;
        assert_eq!(res.status, 200, "{}", res.body);
        assert_eq!(res.body, format!("Sunset sunset.png {}", png.len()));
    }

    #[tokio::test]
    async fn test_multipart_upload_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (headers, body) = upload_request("notes.png", b"just some text");
        let res = app.handle(Method::Post, "/photos", headers, Some(body)).await;
        assert_eq!(res.status, 302);

        let headers = HashMap::from([(
            "Content-Type".to_string(),
            "multipart/form-data".to_string(),
        )]);
        let res = app
            .handle(Method::Post, "/photos", headers, Some(Bytes::from("no boundary")))
            .await;
        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let res = app
            .handle(Method::Post, "/contact", HashMap::new(), Some(Bytes::from(vec![b'x'; 1025])))
            .await;
        assert_eq!(res.status, 413);
    }

    #[tokio::test]
    async fn test_from_config_without_database() {
        let app = App::from_config(
            Config::default(),
            Dispatcher::new(RouteTable::new(), Controllers::new()).unwrap(),
        )
        .unwrap();
        assert!(app.database().is_none());
        assert_eq!(app.csrf().session_key(), "_token");
    }

    #[tokio::test]
    async fn test_from_config_with_lazy_database() {
        let config = Config::from_toml_str("[database]\nurl = \"sqlite::memory:\"\nmax_connections = 1").unwrap();
        let app = App::from_config(
            config,
            Dispatcher::new(RouteTable::new(), Controllers::new()).unwrap(),
        )
        .unwrap();
        let db = app.database().unwrap();
        assert_eq!(db.execute("CREATE TABLE t (id INTEGER)").await.unwrap(), 0);
    }
}
