//! In-page capture hook.
//!
//! Chrome runs the generated script before any page script in every new
//! document. It wraps `window.fetch` and `navigator.sendBeacon`, reports each
//! call that looks like analytics ingestion to a CDP runtime binding, and
//! always forwards to the original function with the original arguments.
//!
//! In a top-level document the script first announces a fresh document id
//! and tags every later report with it, so a page that navigates by itself
//! starts from an empty store. Frames report untagged.
//!
//! The script only prefilters on host and path substrings. The strict URL
//! match and all decoding happen in Rust, in [`HookSession::observe_report`].
//!
//! [`HookSession::observe_report`]: telltale_capture::HookSession::observe_report

use serde_json::Value;
use telltale_capture::IngestionEndpoint;

/// Name of the runtime binding the hook reports to.
pub const BINDING_NAME: &str = "__telltaleReport";

/// A capture hook bound to one hook session generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookScript {
    binding: String,
    generation: u64,
    host: String,
    path: String,
}

impl HookScript {
    #[must_use]
    pub fn new(binding: impl Into<String>, generation: u64, endpoint: &IngestionEndpoint) -> Self {
        Self {
            binding: binding.into(),
            generation,
            host: endpoint.host().to_ascii_lowercase(),
            path: endpoint.path().to_string(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Renders the JavaScript source.
    ///
    /// Every interpolated string goes through JSON encoding.
    #[must_use]
    pub fn render(&self) -> String {
        HOOK_TEMPLATE
            .replace("__BINDING__", &js_string(&self.binding))
            .replace("__GENERATION__", &self.generation.to_string())
            .replace("__HOST__", &js_string(&self.host))
            .replace("__PATH__", &js_string(&self.path))
    }
}

fn js_string(s: &str) -> String {
    Value::from(s).to_string()
}

const HOOK_TEMPLATE: &str = r#"(() => {
  const BINDING = __BINDING__;
  const GENERATION = __GENERATION__;
  const HOST = __HOST__;
  const PATH = __PATH__;
  const MARK = '__telltaleHookGeneration';

  if (window[MARK] === GENERATION) return;
  window[MARK] = GENERATION;

  const newDocumentId = () => {
    try {
      if (window.crypto && typeof window.crypto.randomUUID === 'function') {
        return window.crypto.randomUUID();
      }
    } catch (_) {}
    return Date.now().toString(36) + '-' + Math.random().toString(36).slice(2);
  };

  const DOCUMENT = window === window.top ? newDocumentId() : null;

  const report = (message) => {
    try {
      const send = window[BINDING];
      if (typeof send !== 'function') return;
      message.generation = GENERATION;
      if (DOCUMENT !== null) message.document = DOCUMENT;
      send(JSON.stringify(message));
    } catch (_) {}
  };

  if (DOCUMENT !== null) {
    report({ kind: 'document', url: String(window.location && window.location.href) });
  }

  const urlOf = (input) => {
    if (typeof input === 'string') return input;
    if (input && typeof input.url === 'string') return input.url;
    if (input && typeof input.href === 'string') return input.href;
    return String(input);
  };

  const isCandidate = (url) =>
    typeof url === 'string' &&
    url.toLowerCase().indexOf(HOST) !== -1 &&
    url.indexOf(PATH) !== -1;

  const describe = (body) => {
    if (body === undefined) return { body: null, body_kind: 'undefined' };
    if (body === null) return { body: null, body_kind: 'none' };
    if (typeof body === 'string') return { body: body, body_kind: 'string' };
    const tag = Object.prototype.toString.call(body).slice(8, -1);
    if (tag === 'Object' || tag === 'Array') {
      try {
        JSON.stringify(body);
        return { body: body, body_kind: 'json' };
      } catch (_) {
        return { body: null, body_kind: 'unserializable ' + tag };
      }
    }
    return { body: null, body_kind: tag };
  };

  const observe = (transport, url, body) => {
    try {
      const target = urlOf(url);
      if (!isCandidate(target)) return;
      const described = describe(body);
      report({
        kind: 'call',
        transport: transport,
        url: target,
        body: described.body,
        body_kind: described.body_kind,
      });
    } catch (e) {
      report({ kind: 'error', transport: transport, message: String((e && e.message) || e) });
    }
  };

  const originalFetch = window.fetch;
  if (typeof originalFetch === 'function') {
    window.fetch = function (input, init) {
      observe('fetch', input, init ? init.body : undefined);
      return originalFetch.apply(this, arguments);
    };
  } else {
    report({ kind: 'note', message: 'fetch unavailable; not wrapped' });
  }

  const nav = window.navigator;
  const originalBeacon = nav && nav.sendBeacon;
  if (typeof originalBeacon === 'function') {
    nav.sendBeacon = function (url, data) {
      observe('beacon', url, data);
      return originalBeacon.apply(this, arguments);
    };
  } else {
    report({ kind: 'note', message: 'sendBeacon unavailable; not wrapped' });
  }
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn script() -> String {
        HookScript::new(BINDING_NAME, 7, &IngestionEndpoint::default()).render()
    }

    #[test]
    fn placeholders_are_all_filled() {
        let script = script();
        assert!(!script.contains("__BINDING__"));
        assert!(!script.contains("__GENERATION__"));
        assert!(!script.contains("__HOST__"));
        assert!(!script.contains("__PATH__"));
    }

    #[test]
    fn parameters_are_embedded_as_literals() {
        let script = script();
        assert!(script.contains(r#"const BINDING = "__telltaleReport";"#));
        assert!(script.contains("const GENERATION = 7;"));
        assert!(script.contains(r#"const HOST = "api2.amplitude.com";"#));
        assert!(script.contains(r#"const PATH = "/2/httpapi";"#));
    }

    #[test]
    fn transports_match_report_names() {
        let script = script();
        assert!(script.contains("observe('fetch'"));
        assert!(script.contains("observe('beacon'"));
    }

    #[test]
    fn originals_are_always_called() {
        let script = script();
        assert!(script.contains("return originalFetch.apply(this, arguments);"));
        assert!(script.contains("return originalBeacon.apply(this, arguments);"));
    }

    #[test]
    fn top_level_documents_announce_themselves_first() {
        let script = script();
        let announce = script
            .find("report({ kind: 'document'")
            .expect("document announcement");
        let first_wrap = script.find("window.fetch = function").expect("fetch wrapper");

        assert!(script.contains("const DOCUMENT = window === window.top ? newDocumentId() : null;"));
        assert!(script.contains("if (DOCUMENT !== null) message.document = DOCUMENT;"));
        assert!(announce < first_wrap);
    }

    #[test]
    fn host_prefilter_ignores_case() {
        let endpoint = IngestionEndpoint::new("API2.Amplitude.com", "/2/httpapi");
        let script = HookScript::new(BINDING_NAME, 1, &endpoint).render();

        assert!(script.contains(r#"const HOST = "api2.amplitude.com";"#));
        assert!(script.contains("url.toLowerCase().indexOf(HOST) !== -1"));
    }

    #[test]
    fn hostile_endpoint_values_are_escaped() {
        let endpoint = IngestionEndpoint::new("evil.example", "/\"; alert(1); //");
        let script = HookScript::new(BINDING_NAME, 1, &endpoint).render();
        assert!(script.contains(r#"const PATH = "/\"; alert(1); //";"#));
    }
}
