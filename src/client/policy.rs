use crate::method::Method;

/// How to re-issue a request after a 3xx with a usable `Location`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RedirectAction {
  /// Method for the follow-up request
  pub method: Method,
  /// Whether the body (and its content headers) are dropped
  pub drop_body: bool,
}

/// Method/payload mutation rules for redirects.
///
/// 303 always converts to GET (HEAD stays HEAD). 301/302 convert POST and
/// PATCH to GET with the body dropped; methods that are safe to re-issue
/// keep method and body. 307/308 preserve everything. Other 3xx statuses
/// (300, 304, ...) are not followed.
pub(crate) fn redirect_action(status: u16, method: Method) -> Option<RedirectAction> {
  match status {
    301 | 302 => Some(if method.is_idempotent() {
      RedirectAction { method, drop_body: false }
    } else {
      RedirectAction {
        method: Method::Get,
        drop_body: true,
      }
    }),
    303 => Some(RedirectAction {
      method: if method == Method::Head { Method::Head } else { Method::Get },
      drop_body: true,
    }),
    307 | 308 => Some(RedirectAction { method, drop_body: false }),
    _ => None,
  }
}
