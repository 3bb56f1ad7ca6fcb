//! Routes showing raw parameter and input handling

use tinymvc_core::view::escape_html;
use tinymvc_core::{handler, Context, Controllers, Response, Result, RouteParams};

const NAV: &str = r#"<ul>
    <li><a href="/">home</a></li>
    <li><a href="/user/21/name/johnjoe">user</a></li>
</ul><hr/>"#;

/// Register `HomeController@*`
///
/// # Errors
///
/// Returns `Error::InvalidHandlerRef` on a malformed name.
pub fn register(controllers: &mut Controllers) -> Result<()> {
    controllers
        .register("HomeController@index", handler(index))?
        .register("HomeController@show", handler(show))?
        .register("HomeController@hello", handler(hello))?;
    Ok(())
}

async fn index(_ctx: Context, _params: RouteParams) -> Result<Response> {
    Ok(Response::html(format!(
        r#"{NAV}HomeController index method
<form method="post" action="/hello?data=hello">
    <input name="hello" value="hello world">
    <input type="submit">
</form>"#
    )))
}

async fn show(_ctx: Context, params: RouteParams) -> Result<Response> {
    let id: u64 = params.parse(0)?;
    let name = escape_html(params.get(1).unwrap_or_default());
    Ok(Response::html(format!(
        "{NAV}HomeController show method<br> id: {id} , name: {name}"
    )))
}

async fn hello(ctx: Context, _params: RouteParams) -> Result<Response> {
    let posted = escape_html(ctx.request().post("hello").unwrap_or_default());
    let query = escape_html(ctx.input("data").unwrap_or_default());
    Ok(Response::html(format!(
        "From POST: {posted}<br>From GET: {query}<hr/>HomeController hello method"
    )))
}

#[cfg(test)]
mod tests {
    use crate::test_support::app;
    use std::collections::HashMap;
    use tinymvc_core::Method;

    #[tokio::test]
    async fn test_hello_reads_form_and_query() {
        let app = app();
        let headers = HashMap::from([(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        )]);
        let res = app
            .handle(
                Method::Post,
                "/hello?data=hello",
                headers,
                Some("hello=hello+world".into()),
            )
            .await;
        assert_eq!(res.status, 200);
        assert!(res.body.contains("From POST: hello world"));
        assert!(res.body.contains("From GET: hello"));
    }

    #[tokio::test]
    async fn test_show_rejects_non_numeric_id() {
        let app = app();
        let res = app
            .handle(Method::Get, "/user/abc/name/x", HashMap::new(), None)
            .await;
        assert_eq!(res.status, 404);
    }
}
