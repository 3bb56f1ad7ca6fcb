//! # Users
//!
//! A small resource over the `users` table: HTML pages for listing and
//! creating, JSON for update and delete.

use crate::models::User;
use serde::Deserialize;
use serde_json::json;
use tinymvc_core::view::escape_html;
use tinymvc_core::{
    from_record, handler, BoundParams, Context, Controllers, Model, Response, Result, RouteParams,
};
use tracing::info;

const STORE_RULES: [(&str, &str); 2] = [
    ("name", "required|string|min:3|max:50"),
    ("email", "required|email|unique:users,email"),
];

/// Register `UsersController@*`
///
/// # Errors
///
/// Returns `Error::InvalidHandlerRef` on a malformed name.
pub fn register(controllers: &mut Controllers) -> Result<()> {
    controllers
        .register("UsersController@index", handler(index))?
        .register("UsersController@create", handler(create))?
        .register("UsersController@store", handler(store))?
        .register("UsersController@show", handler(show))?
        .register("UsersController@update", handler(update))?
        .register("UsersController@destroy", handler(destroy))?;
    Ok(())
}

async fn index(ctx: Context, _params: RouteParams) -> Result<Response> {
    let users: Vec<User> = User::query(ctx.db()?)?.get_as().await?;

    let rows: String = users
        .iter()
        .map(|u| {
            format!(
                "<tr><td><a href=\"/users/{}\">{}</a></td><td>{}</td></tr>",
                u.id,
                escape_html(&u.name),
                escape_html(&u.email)
            )
        })
        .collect();

    ctx.render("users.index", &json!({ "rows": rows, "count": users.len() }))
}

async fn create(ctx: Context, _params: RouteParams) -> Result<Response> {
    ctx.render("users.create", &json!({}))
}

async fn store(ctx: Context, _params: RouteParams) -> Result<Response> {
    ctx.verify_csrf()?;
    ctx.validate(&STORE_RULES).await?;

    let mut values = BoundParams::new();
    for field in ["name", "email"] {
        values.set(field, ctx.input(field).unwrap_or_default().trim());
    }
    User::query(ctx.db()?)?.create(values).await?;

    info!(email = ctx.input("email").unwrap_or_default(), "User created");
    Ok(Response::redirect("/users").with("success", "User created!"))
}

async fn show(ctx: Context, params: RouteParams) -> Result<Response> {
    let id: i64 = params.parse(0)?;
    let user: Option<User> = User::query(ctx.db()?)?
        .find(id)
        .await?
        .map(|record| from_record(&record))
        .transpose()?;

    match user {
        Some(user) => ctx.render("users.show", &user),
        None => Ok(ctx.views().render_error(404)),
    }
}

#[derive(Debug, Deserialize)]
struct UserChanges {
    name: String,
}

async fn update(ctx: Context, params: RouteParams) -> Result<Response> {
    let id: i64 = params.parse(0)?;
    let changes: UserChanges = ctx.request().json()?;

    let mut values = BoundParams::new();
    values.set("name", changes.name.trim());
    let updated = User::query(ctx.db()?)?.update(values, id).await?;

    Response::json(&json!({ "id": id, "updated": updated }))
}

async fn destroy(ctx: Context, params: RouteParams) -> Result<Response> {
    let id: i64 = params.parse(0)?;
    let deleted = User::query(ctx.db()?)?.delete(id).await?;
    Response::json(&json!({ "id": id, "deleted": deleted }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::app_with_db;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tinymvc_core::{App, Method, Response};

    fn cookie_of(res: &Response) -> String {
        res.header("Set-Cookie")
            .and_then(|c| c.split(';').next())
            .unwrap()
            .to_string()
    }

    fn csrf_token(html: &str) -> String {
        let marker = "name=\"csrf_token\" value=\"";
        let start = html.find(marker).unwrap() + marker.len();
        html[start..].split('"').next().unwrap().to_string()
    }

    fn headers(cookie: &str, content_type: &str) -> HashMap<String, String> {
        HashMap::from([
            ("Cookie".to_string(), cookie.to_string()),
            ("Content-Type".to_string(), content_type.to_string()),
        ])
    }

    /// Open the create form and submit `body` with its token
    async fn submit(app: &Arc<App>, cookie: Option<&str>, body: &str) -> (String, Response) {
        let page_headers = cookie.map_or_else(HashMap::new, |c| {
            HashMap::from([("Cookie".to_string(), c.to_string())])
        });
        let page = app
            .handle(Method::Get, "/users/create", page_headers, None)
            .await;
        assert_eq!(page.status, 200);
        let cookie = cookie.map_or_else(|| cookie_of(&page), String::from);
        let body = format!("{body}&csrf_token={}", csrf_token(&page.body));

        let res = app
            .handle(
                Method::Post,
                "/users",
                headers(&cookie, "application/x-www-form-urlencoded"),
                Some(body.into()),
            )
            .await;
        (cookie, res)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let app = app_with_db().await;
        let (cookie, res) = submit(&app, None, "name=Ada+Lovelace&email=ada%40example.com").await;
        assert_eq!(res.status, 302);
        assert_eq!(res.header("Location"), Some("/users"));

        let list = app
            .handle(Method::Get, "/users", headers(&cookie, "text/html"), None)
            .await;
        assert_eq!(list.status, 200);
        assert!(list.body.contains("Ada Lovelace"));
        assert!(list.body.contains("User created!"));
        assert!(list.body.contains("1 user(s)"));

        let show = app.handle(Method::Get, "/users/1", HashMap::new(), None).await;
        assert_eq!(show.status, 200);
        assert!(show.body.contains("ada@example.com"));
    }

    #[tokio::test]
    async fn test_invalid_input_redirects_back_with_errors() {
        let app = app_with_db().await;
        let (cookie, res) = submit(&app, None, "name=&email=nope").await;
        assert_eq!(res.status, 302);
        assert_eq!(res.header("Location"), Some("/users/create"));

        let form = app
            .handle(Method::Get, "/users/create", headers(&cookie, "text/html"), None)
            .await;
        assert!(form.body.contains("Name is required!"));
        assert!(form.body.contains("Email should be a valid email!"));
        assert!(form.body.contains("value=\"nope\""));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let app = app_with_db().await;
        let (cookie, _) = submit(&app, None, "name=Ada&email=ada%40example.com").await;
        let (_, res) = submit(&app, Some(&cookie), "name=Other&email=ada%40example.com").await;
        assert_eq!(res.status, 302);

        let form = app
            .handle(Method::Get, "/users/create", headers(&cookie, "text/html"), None)
            .await;
        assert!(form.body.contains("Email already exists!"));
    }

    #[tokio::test]
    async fn test_missing_csrf_token_is_forbidden() {
        let app = app_with_db().await;
        let res = app
            .handle(
                Method::Post,
                "/users",
                headers("", "application/x-www-form-urlencoded"),
                Some("name=Ada&email=ada%40example.com".into()),
            )
            .await;
        assert_eq!(res.status, 403);
    }

    #[tokio::test]
    async fn test_update_and_destroy() {
        let app = app_with_db().await;
        submit(&app, None, "name=Ada&email=ada%40example.com").await;

        let res = app
            .handle(
                Method::Put,
                "/users/1",
                headers("", "application/json"),
                Some(r#"{"name":"Ada L."}"#.into()),
            )
            .await;
        assert_eq!(res.status, 200);
        assert!(res.body.contains("\"updated\":true"));

        let res = app.handle(Method::Delete, "/users/1", HashMap::new(), None).await;
        assert!(res.body.contains("\"deleted\":true"));

        let res = app.handle(Method::Get, "/users/1", HashMap::new(), None).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_show_looks_up_by_primary_key() {
        let app = app_with_db().await;
        submit(&app, None, "name=Ada&email=ada%40example.com").await;
        submit(&app, None, "name=Grace&email=grace%40example.com").await;

        let res = app.handle(Method::Get, "/users/2", HashMap::new(), None).await;
        assert_eq!(res.status, 200);
        assert!(res.body.contains("grace@example.com"));
        assert!(!res.body.contains("ada@example.com"));

        let res = app.handle(Method::Get, "/users/3", HashMap::new(), None).await;
        assert_eq!(res.status, 404);
    }
}
