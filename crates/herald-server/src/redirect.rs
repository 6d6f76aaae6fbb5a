/* crates/herald-server/src/redirect.rs */

use crate::route::RouteTemplate;

/// Path rewrite applied before routing, e.g. legacy URLs moved to new ones.
#[derive(Debug, Clone)]
pub struct RedirectRule {
  from: RouteTemplate,
  /// Target with `{param}` placeholders filled from the matched source path.
  to: String,
  pub permanent: bool,
}

impl RedirectRule {
  pub fn new(from: &str, to: impl Into<String>, permanent: bool) -> Self {
    Self { from: RouteTemplate::new("redirect", from), to: to.into(), permanent }
  }

  pub fn source(&self) -> &str {
    &self.from.pattern
  }

  pub fn target(&self) -> &str {
    &self.to
  }

  /// Target for `path`, or `None` when the rule does not apply.
  pub fn resolve(&self, path: &str) -> Option<String> {
    let params = self.from.matches(path)?;
    let mut target = self.to.clone();
    for (name, value) in params {
      target = target.replace(&format!("{{{name}}}"), &value);
    }
    Some(target)
  }
}

/// First matching rule wins. Redirecting to the same path is ignored.
pub fn resolve_redirect(rules: &[RedirectRule], path: &str) -> Option<(String, bool)> {
  rules.iter().find_map(|rule| {
    let target = rule.resolve(path)?;
    (target != path).then_some((target, rule.permanent))
  })
}
