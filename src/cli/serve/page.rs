//! Embedded preview page.
//!
//! Served from memory for `GET /<view>`; no assets on disk. The page shows
//! the rendered frame, refetches it on live reload messages, and reports
//! the payload size/budget from the size endpoint.

use crate::view::ViewId;

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>inkpeek - __VIEW__</title>
<style>
  body { margin: 0; font-family: system-ui, sans-serif; background: #222; color: #ddd; }
  nav { padding: 10px 16px; background: #111; display: flex; gap: 14px; align-items: center; }
  nav a { color: #9cf; text-decoration: none; }
  nav a.active { color: #fff; font-weight: bold; }
  nav .spacer { flex: 1; }
  main { display: flex; flex-direction: column; align-items: center; padding: 24px; }
  #frame { background: #fff; border: 8px solid #000; border-radius: 6px; image-rendering: pixelated; }
  #status { margin-top: 12px; font-size: 13px; color: #888; }
  #status .green { color: #6c6; }
  #status .yellow { color: #cc6; }
  #status .red { color: #c66; }
  #banner { display: none; background: #731; color: #fff; padding: 6px 16px; font-size: 13px; }
</style>
</head>
<body>
<nav>
  <a href="/full">full</a>
  <a href="/half_horizontal">half_horizontal</a>
  <a href="/half_vertical">half_vertical</a>
  <a href="/quadrant">quadrant</a>
  <span class="spacer"></span>
  <a href="/render/__VIEW__.html">markup</a>
  <a href="/data">data</a>
  <a href="/poll">poll</a>
</nav>
<div id="banner">File watching stopped. Edits will not refresh automatically; use poll.</div>
<main>
  <img id="frame" src="/render/__VIEW__.png" alt="__VIEW__ preview">
  <div id="status">rendering&hellip;</div>
</main>
<script>
(function () {
  var view = "__VIEW__";
  var wsPort = __WS_PORT__;
  var frame = document.getElementById("frame");
  var status = document.getElementById("status");

  document.querySelectorAll("nav a").forEach(function (a) {
    if (a.getAttribute("href") === "/" + view) a.className = "active";
  });

  function refresh() {
    frame.src = "/render/" + view + ".png?t=" + Date.now();
    fetch("/render/" + view + ".size")
      .then(function (r) { return r.json(); })
      .then(function (s) {
        status.innerHTML = "png " + (s.png_size / 1024).toFixed(1) + " KiB " +
          '<span class="' + s.png_budget + '">(' + s.png_budget + ")</span>" +
          " &middot; html " + (s.html_size / 1024).toFixed(1) + " KiB";
      })
      .catch(function () { status.textContent = "size unavailable"; });
  }

  function connect() {
    var ws = new WebSocket("ws://" + location.hostname + ":" + wsPort);
    ws.onmessage = function (event) {
      var msg = JSON.parse(event.data);
      if (msg.type === "reload") refresh();
      if (msg.type === "watcher_stopped")
        document.getElementById("banner").style.display = "block";
    };
    ws.onclose = function () { setTimeout(connect, 1000); };
  }

  refresh();
  connect();
})();
</script>
</body>
</html>
"#;

/// Render the preview page for a view.
pub fn preview_page(view: ViewId, ws_port: u16) -> String {
    PAGE_TEMPLATE
        .replace("__VIEW__", view.as_str())
        .replace("__WS_PORT__", &ws_port.to_string())
}
