//! Static pages rendered straight from views

use serde_json::json;
use tinymvc_core::{handler, Context, Controllers, Response, Result, RouteParams};

/// Register `PagesController@*`
///
/// # Errors
///
/// Returns `Error::InvalidHandlerRef` on a malformed name.
pub fn register(controllers: &mut Controllers) -> Result<()> {
    controllers
        .register("PagesController@index", handler(index))?
        .register("PagesController@contact", handler(contact))?
        .register("PagesController@about", handler(about))?;
    Ok(())
}

async fn index(ctx: Context, _params: RouteParams) -> Result<Response> {
    ctx.render("home", &json!({ "app": ctx.config().app.name }))
}

async fn contact(ctx: Context, _params: RouteParams) -> Result<Response> {
    ctx.render("contact", &json!({ "app": ctx.config().app.name }))
}

async fn about(ctx: Context, _params: RouteParams) -> Result<Response> {
    ctx.render("about", &json!({ "app": ctx.config().app.name }))
}
