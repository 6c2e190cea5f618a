//! Live-reload client injection into served HTML.

/// WebSocket endpoint the injected client connects to.
pub const LIVERELOAD_PATH: &str = "/__sitepipe/livereload";

/// Client script: reloads the page, or swaps stylesheet links in place.
const CLIENT_SCRIPT: &str = r#"<script>
(function () {
  var retry = 500;
  function connect() {
    var proto = location.protocol === "https:" ? "wss://" : "ws://";
    var ws = new WebSocket(proto + location.host + "__PATH__");
    ws.onopen = function () { retry = 500; };
    ws.onmessage = function (msg) {
      var event = JSON.parse(msg.data);
      if (event.type === "reload") {
        location.reload();
      } else if (event.type === "css") {
        var targets = event.paths.map(function (path) { return "/" + path; });
        var swapped = 0;
        document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
          // link.href is already resolved against the page URL
          var url = new URL(link.href, location.href);
          if (url.origin === location.origin && targets.indexOf(url.pathname) !== -1) {
            url.searchParams.set("v", Date.now());
            link.href = url.href;
            swapped++;
          }
        });
        if (swapped === 0) {
          location.reload();
        }
      }
    };
    ws.onclose = function () {
      setTimeout(connect, retry);
      retry = Math.min(retry * 2, 5000);
    };
  }
  connect();
})();
</script>
"#;

/// The client script as injected.
pub fn client_script() -> String {
    CLIENT_SCRIPT.replace("__PATH__", LIVERELOAD_PATH)
}

/// Insert the client script before the last `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let script = client_script();
    let lower = html.to_ascii_lowercase();

    match lower.rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..idx]);
            out.push_str(&script);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{}{}", html, script),
    }
}
