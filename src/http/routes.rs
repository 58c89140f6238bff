//! Route table.
//!
//! # Responsibilities
//! - Map paths and methods under the base path onto [`Page`] values
//! - Serve the built-in endpoints (robots.txt, health, static assets, metrics)
//! - Answer 404 for unknown paths and 405 for known paths with the wrong method
//! - Turn handler panics into 500 responses
//!
//! Page rendering lives behind [`PageHandler`].

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get, on, MethodFilter, MethodRouter},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir};

use crate::observability::metrics::{render_metrics, HttpMetrics};

pub const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /";
pub const NOT_FOUND_BODY: &str = "404 page not found";

/// A page the storefront serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Home,
    Product,
    ViewCart,
    AddToCart,
    EmptyCart,
    SetCurrency,
    Logout,
    PlaceOrder,
    Assistant,
    ChatBot,
    ProductMeta,
}

impl Page {
    pub const ALL: [Page; 11] = [
        Page::Home,
        Page::Product,
        Page::ViewCart,
        Page::AddToCart,
        Page::EmptyCart,
        Page::SetCurrency,
        Page::Logout,
        Page::PlaceOrder,
        Page::Assistant,
        Page::ChatBot,
        Page::ProductMeta,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Page::Home => "home",
            Page::Product => "product",
            Page::ViewCart => "viewCart",
            Page::AddToCart => "addToCart",
            Page::EmptyCart => "emptyCart",
            Page::SetCurrency => "setCurrency",
            Page::Logout => "logout",
            Page::PlaceOrder => "placeOrder",
            Page::Assistant => "assistant",
            Page::ChatBot => "chatBot",
            Page::ProductMeta => "getProductByID",
        }
    }

    /// Route pattern relative to the base path.
    pub fn path(self) -> &'static str {
        match self {
            Page::Home => "/",
            Page::Product => "/product/{id}",
            Page::ViewCart | Page::AddToCart => "/cart",
            Page::EmptyCart => "/cart/empty",
            Page::SetCurrency => "/setCurrency",
            Page::Logout => "/logout",
            Page::PlaceOrder => "/cart/checkout",
            Page::Assistant => "/assistant",
            Page::ChatBot => "/bot",
            Page::ProductMeta => "/product-meta/{ids}",
        }
    }

    pub fn methods(self) -> MethodFilter {
        match self {
            Page::Home | Page::Product | Page::ViewCart => MethodFilter::GET.or(MethodFilter::HEAD),
            Page::Logout | Page::Assistant | Page::ProductMeta => MethodFilter::GET,
            Page::AddToCart | Page::EmptyCart | Page::SetCurrency | Page::PlaceOrder | Page::ChatBot => {
                MethodFilter::POST
            }
        }
    }
}

/// The page/business handlers the gateway dispatches to.
pub trait PageHandler: Clone + Send + Sync + 'static {
    fn handle(&self, page: Page, request: Request) -> impl Future<Output = Response> + Send;
}

/// Stand-in used when no page handlers are linked in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnwiredPages;

impl PageHandler for UnwiredPages {
    async fn handle(&self, page: Page, _request: Request) -> Response {
        (
            StatusCode::NOT_IMPLEMENTED,
            format!("page '{}' has no handler", page.name()),
        )
            .into_response()
    }
}

fn prefixed(base_path: &str, path: &str) -> String {
    format!("{}{}", base_path.trim_end_matches('/'), path)
}

/// Build the dispatcher: page routes, built-ins and the 404 fallback.
pub fn dispatcher<P: PageHandler>(
    base_path: &str,
    pages: P,
    static_dir: &Path,
    metrics: Arc<HttpMetrics>,
) -> Router {
    let mut grouped: BTreeMap<String, MethodRouter> = BTreeMap::new();
    for page in Page::ALL {
        let pages = pages.clone();
        let handler = move |request: Request| {
            let pages = pages.clone();
            async move { pages.handle(page, request).await }
        };

        let path = prefixed(base_path, page.path());
        let route = match grouped.remove(&path) {
            Some(existing) => existing.on(page.methods(), handler),
            None => on(page.methods(), handler),
        };
        grouped.insert(path, route);
    }

    let mut router = Router::new();
    for (path, route) in grouped {
        router = router.route(&path, route);
    }

    let exposition_path = metrics.exposition_path().to_string();
    router
        .route(&prefixed(base_path, "/robots.txt"), any(|| async { ROBOTS_TXT }))
        .route(&prefixed(base_path, "/_healthz"), any(|| async { "ok" }))
        .nest_service(&prefixed(base_path, "/static"), ServeDir::new(static_dir))
        .route(&exposition_path, get(render_metrics).with_state(metrics))
        .fallback(|| async { (StatusCode::NOT_FOUND, NOT_FOUND_BODY) })
        .layer(CatchPanicLayer::new())
}
