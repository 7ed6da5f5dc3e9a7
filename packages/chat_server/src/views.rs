use axum::response::{Html, IntoResponse};
use chat_protocol::{CHAT_MESSAGE_EVENT, USERNAME_PARAM, WS_PATH};
use maud::{DOCTYPE, Markup, PreEscaped, html};

const CSS: &str = r#"
body { font-family: Tahoma, Verdana, sans-serif; margin: 0; background: #e9f3fb; }
#login, #chat { max-width: 640px; margin: 2rem auto; background: #fff; border: 1px solid #9cc3e5; }
header { background: #00aff0; color: #fff; padding: .5rem 1rem; display: flex; justify-content: space-between; }
#status { cursor: pointer; }
#messages { height: 55vh; overflow-y: auto; padding: 1rem; }
.msg { margin: .4rem 0; }
.msg.self { text-align: right; }
.msg .author { font-size: .75rem; color: #555; display: block; }
.msg .bubble { display: inline-block; padding: .35rem .6rem; border-radius: 8px; background: #f1f1f1; }
.msg.self .bubble { background: #cbe9fb; }
.msg .time { font-size: .7rem; color: #888; margin-left: .4rem; }
.empty { color: #888; text-align: center; }
form { display: flex; gap: .5rem; padding: .75rem 1rem; border-top: 1px solid #ddd; }
form input { flex: 1; padding: .4rem; }
.error { color: #b00020; padding: 0 1rem; }
"#;

// Browser twin of the terminal client: same envelope, same handshake,
// reconnect only on click.
const JAVASCRIPT: &str = r#"
(function () {
  const EVENT = document.body.dataset.event;
  const WS_PATH = document.body.dataset.wsPath;
  const USERNAME_PARAM = document.body.dataset.usernameParam;
  let socket = null;
  let username = null;
  let connected = false;

  const $ = (id) => document.getElementById(id);
  const pad = (n) => n.toString().padStart(2, '0');

  function setConnected(value) {
    connected = value;
    $('status').textContent = value ? '● Online' : '○ Offline - click to connect';
    $('text').disabled = !value;
    $('send').disabled = !value;
  }

  function isEnvelope(data) {
    return !!data && typeof data.user === 'string' && typeof data.text === 'string';
  }

  function append(envelope) {
    if ($('empty')) $('empty').remove();
    const now = new Date();
    const row = document.createElement('div');
    row.className = 'msg ' + (envelope.user === username ? 'self' : 'other');
    const author = document.createElement('span');
    author.className = 'author';
    author.textContent = envelope.user;
    const bubble = document.createElement('span');
    bubble.className = 'bubble';
    bubble.textContent = envelope.text;
    const time = document.createElement('span');
    time.className = 'time';
    time.textContent = pad(now.getHours()) + ':' + pad(now.getMinutes());
    row.append(author, bubble, time);
    $('messages').append(row);
    row.scrollIntoView({ behavior: 'smooth' });
  }

  function connect() {
    if (socket) return;
    const scheme = location.protocol === 'https:' ? 'wss:' : 'ws:';
    const url = scheme + '//' + location.host + WS_PATH + '?' + USERNAME_PARAM + '=' + encodeURIComponent(username);
    socket = new WebSocket(url);
    socket.onopen = () => setConnected(true);
    socket.onclose = () => { socket = null; setConnected(false); };
    socket.onmessage = (ev) => {
      let frame;
      try { frame = JSON.parse(ev.data); } catch (_) { return; }
      if (frame.event === EVENT && isEnvelope(frame.data)) append(frame.data);
    };
  }

  function disconnect() {
    if (socket) socket.close();
  }

  $('login-form').addEventListener('submit', (ev) => {
    ev.preventDefault();
    const name = $('username').value.trim();
    if (name.length < 2) { $('login-error').textContent = 'Display name must be at least 2 characters'; return; }
    if (name.length > 20) { $('login-error').textContent = 'Display name must be at most 20 characters'; return; }
    username = name;
    $('me').textContent = name;
    $('login').hidden = true;
    $('chat').hidden = false;
    connect();
  });

  $('status').addEventListener('click', () => (connected ? disconnect() : connect()));

  $('chat-form').addEventListener('submit', (ev) => {
    ev.preventDefault();
    const text = $('text').value.trim();
    if (!text || !connected) return;
    socket.send(JSON.stringify({ event: EVENT, data: { user: username, text: text } }));
    $('text').value = '';
  });
})();
"#;

fn login_panel() -> Markup {
    html! {
        section id="login" {
            header { span { "Relay Chat - Sign In" } }
            form id="login-form" {
                input id="username" type="text" maxlength="20" placeholder="Pick a display name..." autofocus;
                button type="submit" { "Sign In" }
            }
            div id="login-error" class="error" {}
        }
    }
}

fn chat_panel() -> Markup {
    html! {
        section id="chat" hidden {
            header {
                span { "General Chat - " span id="me" {} }
                span id="status" { "○ Offline - click to connect" }
            }
            div id="messages" {
                div id="empty" class="empty" { "No messages yet. Say hi!" }
            }
            form id="chat-form" {
                input id="text" type="text" placeholder="Type a message..." disabled;
                button id="send" type="submit" disabled { "Send" }
            }
        }
    }
}

/// Client entry page served at `/`.
pub async fn index_page() -> impl IntoResponse {
    let markup = html! {
        (DOCTYPE)
        html {
            head {
                title { "Relay Chat" }
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                style { (PreEscaped(CSS)) }
            }
            body data-event=(CHAT_MESSAGE_EVENT) data-ws-path=(WS_PATH) data-username-param=(USERNAME_PARAM) {
                (login_panel())
                (chat_panel())
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    };

    Html(markup.into_string())
}
