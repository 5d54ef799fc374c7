use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Buf;
use futures_util::TryStreamExt;
use log::{debug, error, warn};
use serde::Serialize;
use warp::http::{header, HeaderValue, StatusCode};
use warp::multipart::FormData;
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::auth::{self, LoginForm, Session, SessionLookup, AUTH_COOKIE};
use crate::form::{self, Field, FieldKind};
use crate::markdown;
use crate::message::{self, Message};
use crate::modpack::{Item, ItemList, ModpackServer};
use crate::mpds::{self, Error, ModpackUpdate, Mpds, MpdsAuthed};
use crate::page;

const MAX_FORM_SIZE: u64 = 1024 * 1024;
const MAX_UPLOAD_SIZE: u64 = 4 * 1024 * 1024;

const REMOVE_SERVER_FIELDS: &[Field] = &[Field {
    name: "id",
    kind: FieldKind::String,
}];

pub struct Settings {
    pub secure: bool,
    pub public_dir: PathBuf,
    /// Markdown source of the `/docs` page.
    pub docs_file: PathBuf,
}

/// Per-request state, built before any handler runs.
pub struct Context {
    mpds: Arc<Mpds>,
    path: String,
    session: Option<Session>,
    messages: Vec<Message>,
    /// The presented cookie names no live session and should be removed.
    stale_cookie: bool,
    secure: bool,
}

impl Context {
    async fn load(
        mpds: Arc<Mpds>,
        secure: bool,
        path: String,
        cookie: Option<String>,
        query: HashMap<String, String>,
    ) -> mpds::Result<Self> {
        let messages = query
            .get("msg")
            .map(|msg| message::parse(msg))
            .unwrap_or_default();

        let mut ctx = Self {
            mpds,
            path,
            session: None,
            messages,
            stale_cookie: false,
            secure,
        };

        let Some(cookie) = cookie else {
            return Ok(ctx);
        };

        let Some(presented) = Session::from_cookie(&cookie) else {
            ctx.stale_cookie = true;
            return Ok(ctx);
        };

        match ctx.mpds.authenticate(&presented.token).await? {
            SessionLookup::Valid(session) => ctx.session = Some(session),
            SessionLookup::ExpiredRevoked | SessionLookup::NotFound => ctx.stale_cookie = true,
        }

        Ok(ctx)
    }

    pub fn authorize(&self) -> mpds::Result<MpdsAuthed> {
        match &self.session {
            Some(session) => Ok(self.mpds.authed(session.clone())),
            None => {
                debug!("{}: no session", self.path);
                Err(Error::Forbidden)
            }
        }
    }

    fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    fn finish(&self, reply: impl Reply) -> Response {
        let mut res = reply.into_response();
        if self.stale_cookie {
            set_cookie(&mut res, &auth::clear_cookie(self.secure));
        }
        res
    }

    fn page(&self, title: &str, body: &str) -> Response {
        let html = page::layout(title, body, self.username(), &self.messages);
        self.finish(warp::reply::html(html))
    }

    fn redirect(&self, location: &str, msg: Option<Message>) -> Response {
        let location = match msg {
            Some(msg) => msg.redirect_url(location),
            None => location.to_string(),
        };

        self.finish(warp::reply::with_header(
            StatusCode::SEE_OTHER,
            header::LOCATION,
            location,
        ))
    }

    fn error_page(&self, e: Error) -> Response {
        let status = StatusCode::from(e);
        let title = status.canonical_reason().unwrap_or("Error");
        let body = page::error(&describe(e, Some(&self.path)));
        let html = page::layout(title, &body, self.username(), &self.messages);

        self.finish(warp::reply::with_status(warp::reply::html(html), status))
    }

    fn respond(&self, result: mpds::Result<Response>) -> Response {
        result.unwrap_or_else(|e| self.error_page(e))
    }

    fn respond_api(&self, result: mpds::Result<Response>) -> Response {
        match result {
            Ok(res) => self.finish(res),
            Err(e) => self.finish(api_error(e, Some(&self.path))),
        }
    }
}

fn set_cookie(res: &mut Response, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            res.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => error!("unencodable cookie: {e}"),
    }
}

fn describe(e: Error, path: Option<&str>) -> String {
    let resource = match path {
        Some(path) => format!("Resource \"{path}\""),
        None => "Resource".to_string(),
    };

    match e {
        Error::Forbidden => {
            format!("{resource} is forbidden. Please check your URL and try again.")
        }
        Error::NotFound => {
            format!("{resource} was not found. Please check your URL and try again.")
        }
        Error::Internal => "An unknown server error occured. Please try again later, \
            or contact the webmaster if this issue persists."
            .to_string(),
        Error::BadRequest => "The request could not be understood.".to_string(),
        Error::Invalid(text) => text.to_string(),
    }
}

#[derive(Serialize)]
struct ApiError {
    status: u16,
    message: String,
}

fn api_error(e: Error, path: Option<&str>) -> Response {
    let status = StatusCode::from(e);
    let body = ApiError {
        status: status.as_u16(),
        message: describe(e, path),
    };

    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn json<T: Serialize>(value: &T) -> Response {
    warp::reply::json(value).into_response()
}

fn with_context(
    mpds: Arc<Mpds>,
    secure: bool,
) -> impl Filter<Extract = (Context,), Error = Rejection> + Clone {
    warp::path::full()
        .and(warp::cookie::optional::<String>(AUTH_COOKIE))
        .and(warp::query::<HashMap<String, String>>())
        .and_then(
            move |path: FullPath, cookie: Option<String>, query: HashMap<String, String>| {
                let mpds = Arc::clone(&mpds);
                async move {
                    Context::load(mpds, secure, path.as_str().to_string(), cookie, query)
                        .await
                        .map_err(warp::reject::custom)
                }
            },
        )
}

pub fn routes(
    mpds: Arc<Mpds>,
    settings: Settings,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let ctx = with_context(mpds, settings.secure);
    let form = warp::body::content_length_limit(MAX_FORM_SIZE)
        .and(warp::body::form::<HashMap<String, String>>());

    let web = {
        let home = warp::path::end()
            .and(warp::get())
            .and(ctx.clone())
            .and_then(web::home);

        let docs_file = settings.docs_file;
        let docs = warp::path!("docs")
            .and(warp::get())
            .and(ctx.clone())
            .and(warp::any().map(move || docs_file.clone()))
            .and_then(web::docs);

        let login_page = warp::path!("login")
            .and(warp::get())
            .and(ctx.clone())
            .and_then(web::login_page);

        let login = warp::path!("login")
            .and(warp::post())
            .and(ctx.clone())
            .and(form.clone())
            .and_then(web::login);

        let logout = warp::path!("logout")
            .and(warp::get().or(warp::post()).unify())
            .and(ctx.clone())
            .and_then(web::logout);

        let admin = warp::path!("admin")
            .and(warp::get())
            .and(ctx.clone())
            .and_then(web::admin);

        let modpack = warp::path!("admin" / "modpack")
            .and(warp::get())
            .and(ctx.clone())
            .and_then(web::modpack);

        let update_modpack = warp::path!("admin" / "modpack" / "update")
            .and(warp::post())
            .and(ctx.clone())
            .and(warp::multipart::form().max_length(MAX_UPLOAD_SIZE))
            .and_then(web::update_modpack);

        let items = warp::path!("admin" / "modpack" / String)
            .and(warp::get())
            .and(ctx.clone())
            .and_then(web::items);

        let update_items = warp::path!("admin" / "modpack" / String / "update")
            .and(warp::post())
            .and(ctx.clone())
            .and(form.clone())
            .and_then(web::update_items);

        home.or(docs)
            .or(login_page)
            .or(login)
            .or(logout)
            .or(admin)
            .or(modpack)
            .or(update_modpack)
            .or(items)
            .or(update_items)
    };

    let api = {
        let ping = warp::path!("v1" / "ping")
            .and(warp::get())
            .and(ctx.clone())
            .and_then(api::ping);

        let modpack = warp::path!("v1" / "modpack")
            .and(warp::get())
            .and(ctx.clone())
            .and_then(api::modpack);

        let items = warp::path!("v1" / "items" / String)
            .and(warp::get())
            .and(ctx.clone())
            .and_then(api::items);

        let icon = warp::path!("v1" / "icons" / String)
            .and(warp::get())
            .and(ctx.clone())
            .and_then(api::icon);

        let servers = warp::path!("v1" / "servers")
            .and(warp::get())
            .and(ctx.clone())
            .and_then(api::servers);

        let servers_for = warp::path!("v1" / "servers" / String)
            .and(warp::get())
            .and(ctx.clone())
            .and_then(api::servers_for);

        let server = warp::path!("v1" / "servers" / String / String)
            .and(warp::get())
            .and(ctx.clone())
            .and_then(api::server);

        let add_server = warp::path!("v1" / "servers" / "add")
            .and(warp::post())
            .and(ctx.clone())
            .and(form.clone())
            .and_then(api::add_server);

        let remove_server = warp::path!("v1" / "servers" / "remove")
            .and(warp::post())
            .and(ctx)
            .and(form)
            .and_then(api::remove_server);

        warp::path("api").and(
            ping.or(modpack)
                .or(items)
                .or(icon)
                .or(servers)
                .or(servers_for)
                .or(server)
                .or(add_server)
                .or(remove_server)
                .recover(api_rejection),
        )
    };

    let public = warp::fs::dir(settings.public_dir);

    api.or(web).or(public).recover(web_rejection)
}

fn classify(err: &Rejection) -> (StatusCode, String) {
    if err.is_not_found() {
        return (StatusCode::NOT_FOUND, describe(Error::NotFound, None));
    }

    if let Some(e) = err.find::<Error>() {
        return (StatusCode::from(*e), describe(*e, None));
    }

    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            "The upload is too large.".to_string(),
        );
    }

    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed.".to_string(),
        );
    }

    debug!("rejected: {err:?}");
    (StatusCode::BAD_REQUEST, describe(Error::BadRequest, None))
}

async fn web_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = classify(&err);
    let title = status.canonical_reason().unwrap_or("Error");
    let html = page::layout(title, &page::error(&message), None, &[]);

    Ok(warp::reply::with_status(warp::reply::html(html), status).into_response())
}

async fn api_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = classify(&err);
    let body = ApiError {
        status: status.as_u16(),
        message,
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}

/// Text fields and the optional `icon` file of a multipart upload.
/// Parts are read one at a time, each drained before the next is requested.
async fn read_multipart(
    mut form: FormData,
) -> mpds::Result<(HashMap<String, String>, Option<Vec<u8>>)> {
    let mut fields = HashMap::new();
    let mut icon = None;

    while let Some(part) = form.try_next().await.map_err(|e| {
        warn!("bad multipart body: {e}");
        Error::BadRequest
    })? {
        let name = part.name().to_string();
        let is_file = part.filename().is_some();

        let data = part
            .stream()
            .try_fold(Vec::new(), |mut acc, buf| async move {
                acc.extend_from_slice(buf.chunk());
                Ok(acc)
            })
            .await
            .map_err(|e| {
                warn!("couldn't read multipart field {name}: {e}");
                Error::BadRequest
            })?;

        if is_file {
            if name == "icon" {
                icon = Some(data);
            }
            continue;
        }

        let text = String::from_utf8(data).map_err(|_| {
            warn!("multipart field {name} isn't utf-8");
            Error::BadRequest
        })?;
        fields.insert(name, text);
    }

    Ok((fields, icon))
}

mod web {
    use super::*;

    pub async fn home(ctx: Context) -> Result<Response, Infallible> {
        let result = async {
            let meta = ctx.mpds.modpack().await?;
            let counts = ctx.mpds.item_counts().await?;
            Ok::<_, Error>(ctx.page(&meta.name, &page::home(&meta, &counts)))
        }
        .await;

        Ok(ctx.respond(result))
    }

    pub async fn docs(ctx: Context, file: PathBuf) -> Result<Response, Infallible> {
        let result = match tokio::fs::read_to_string(&file).await {
            Ok(md) => Ok(ctx.page(
                "Modpacker Distro Server Docs",
                &page::docs(&markdown::render(&md)),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("no docs at {}", file.display());
                Err(Error::NotFound)
            }
            Err(e) => {
                error!("couldn't read {}: {e}", file.display());
                Err(Error::Internal)
            }
        };

        Ok(ctx.respond(result))
    }

    pub async fn login_page(ctx: Context) -> Result<Response, Infallible> {
        Ok(ctx.page("Modpacker Distro Server Login", &page::login()))
    }

    pub async fn login(ctx: Context, raw: HashMap<String, String>) -> Result<Response, Infallible> {
        let form = match LoginForm::parse(&raw) {
            Ok(form) => form,
            Err(e) => {
                return Ok(ctx.redirect("/login", Some(Message::warning(e.message()))));
            }
        };

        Ok(match ctx.mpds.login(&form).await {
            Ok(Some(session)) => {
                let welcome = Message::info(format!("Logged in as {}.", session.username));
                let mut res = ctx.redirect("/", Some(welcome));
                set_cookie(&mut res, &session.cookie(form.lifetime(), ctx.secure));
                res
            }
            Ok(None) => ctx.redirect(
                "/login",
                Some(Message::error("Invalid username or password.")),
            ),
            Err(e) => ctx.error_page(e),
        })
    }

    pub async fn logout(ctx: Context) -> Result<Response, Infallible> {
        let Ok(authed) = ctx.authorize() else {
            return Ok(ctx.redirect("/login", None));
        };

        if let Err(e) = authed.logout().await {
            return Ok(ctx.error_page(e));
        }

        let mut res = ctx.redirect("/login", Some(Message::info("Logged out.")));
        set_cookie(&mut res, &auth::clear_cookie(ctx.secure));
        Ok(res)
    }

    pub async fn admin(ctx: Context) -> Result<Response, Infallible> {
        let result = ctx
            .authorize()
            .map(|authed| ctx.page("Admin", &page::admin_home(authed.username())));

        Ok(ctx.respond(result))
    }

    pub async fn modpack(ctx: Context) -> Result<Response, Infallible> {
        let result = async {
            ctx.authorize()?;
            let meta = ctx.mpds.modpack().await?;
            Ok::<_, Error>(ctx.page("Modpack", &page::modpack_editor(&meta)))
        }
        .await;

        Ok(ctx.respond(result))
    }

    pub async fn update_modpack(ctx: Context, form: FormData) -> Result<Response, Infallible> {
        const BACK: &str = "/admin/modpack";

        let result = async {
            let authed = ctx.authorize()?;
            let (raw, icon) = read_multipart(form).await?;

            let update = ModpackUpdate::parse(&raw).map_err(Error::from)?;
            authed.update_modpack(update, icon).await?;

            Ok::<_, Error>(ctx.redirect(BACK, Some(Message::info("Modpack Meta Updated!"))))
        }
        .await;

        Ok(match result {
            Err(Error::Invalid(text)) => ctx.redirect(BACK, Some(Message::warning(text))),
            result => ctx.respond(result),
        })
    }

    pub async fn items(list: String, ctx: Context) -> Result<Response, Infallible> {
        let result = async {
            ctx.authorize()?;
            let list: ItemList = list.parse().map_err(|()| Error::NotFound)?;

            let meta = ctx.mpds.modpack().await?;
            let items = ctx.mpds.items(list).await?;

            Ok::<_, Error>(ctx.page(
                list.display_name(),
                &page::item_editor(list, &meta, &items),
            ))
        }
        .await;

        Ok(ctx.respond(result))
    }

    pub async fn update_items(
        list: String,
        ctx: Context,
        raw: HashMap<String, String>,
    ) -> Result<Response, Infallible> {
        let back = format!("/admin/modpack/{list}");

        let result = async {
            let authed = ctx.authorize()?;
            let list: ItemList = list.parse().map_err(|()| Error::NotFound)?;

            let json = raw.get("items").ok_or(Error::Invalid("Please fill in every field."))?;
            let items: Vec<Item> = serde_json::from_str(json).map_err(|e| {
                debug!("bad item list: {e}");
                Error::Invalid("Items must be a JSON list of projects.")
            })?;

            let changes = authed.update_items(list, items).await?;
            let summary = format!(
                "{}: {} added, {} removed, {} updated.",
                list.display_name(),
                changes.add.len(),
                changes.remove.len(),
                changes.update.len(),
            );

            Ok::<_, Error>(ctx.redirect(&back, Some(Message::info(summary))))
        }
        .await;

        Ok(match result {
            Err(Error::Invalid(text)) => ctx.redirect(&back, Some(Message::warning(text))),
            result => ctx.respond(result),
        })
    }
}

mod api {
    use super::*;

    #[derive(Serialize)]
    struct Ping {
        time: String,
        message: &'static str,
    }

    #[derive(Serialize)]
    struct Processed {
        processed: bool,
    }

    pub async fn ping(ctx: Context) -> Result<Response, Infallible> {
        let result = mpds::now().and_then(|now| {
            let time = now.to_http_date().ok_or(Error::Internal)?;
            Ok(json(&Ping {
                time,
                message: "APIv1 is working.",
            }))
        });

        Ok(ctx.respond_api(result))
    }

    pub async fn modpack(ctx: Context) -> Result<Response, Infallible> {
        let result = ctx.mpds.modpack().await.map(|meta| json(&meta));
        Ok(ctx.respond_api(result))
    }

    pub async fn items(list: String, ctx: Context) -> Result<Response, Infallible> {
        let result = async {
            let list: ItemList = list.parse().map_err(|()| Error::NotFound)?;
            let items = ctx.mpds.items(list).await?;
            Ok::<_, Error>(json(&items))
        }
        .await;

        Ok(ctx.respond_api(result))
    }

    pub async fn icon(id: String, ctx: Context) -> Result<Response, Infallible> {
        let result = ctx.mpds.icon(&id).await.map(|data| {
            warp::reply::with_header(data, header::CONTENT_TYPE, "image/jpeg").into_response()
        });

        Ok(ctx.respond_api(result))
    }

    pub async fn servers(ctx: Context) -> Result<Response, Infallible> {
        let result = ctx.mpds.servers(None).await.map(|s| json(&s));
        Ok(ctx.respond_api(result))
    }

    pub async fn servers_for(versions: String, ctx: Context) -> Result<Response, Infallible> {
        let result = ctx.mpds.servers(Some(&versions)).await.map(|s| json(&s));
        Ok(ctx.respond_api(result))
    }

    pub async fn server(versions: String, id: String, ctx: Context) -> Result<Response, Infallible> {
        let result = ctx.mpds.server(&versions, &id).await.map(|s| json(&s));
        Ok(ctx.respond_api(result))
    }

    pub async fn add_server(
        ctx: Context,
        raw: HashMap<String, String>,
    ) -> Result<Response, Infallible> {
        let result = async {
            let authed = ctx.authorize()?;
            let server = ModpackServer::parse(&raw)?;
            let servers = authed.add_server(server).await?;
            Ok::<_, Error>(json(&servers))
        }
        .await;

        Ok(ctx.respond_api(result))
    }

    pub async fn remove_server(
        ctx: Context,
        raw: HashMap<String, String>,
    ) -> Result<Response, Infallible> {
        let result = async {
            let authed = ctx.authorize()?;
            let id = form::parse(REMOVE_SERVER_FIELDS, &raw)?.string("id")?;
            authed.remove_server(&id).await?;
            Ok::<_, Error>(json(&Processed { processed: true }))
        }
        .await;

        Ok(ctx.respond_api(result))
    }
}

#[cfg(test)]
mod test {
    use cookie::Cookie;
    use serde_json::{json, Value};
    use warp::test::request;

    use super::*;
    use crate::backend;
    use crate::mpds::test::create_mpds;
    use crate::schema::SESSIONS;
    use crate::time::Timestamp;

    const FORM: &str = "application/x-www-form-urlencoded";

    fn filter(mpds: &Arc<Mpds>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        routes(
            Arc::clone(mpds),
            Settings {
                secure: false,
                public_dir: std::env::temp_dir().join("mpds-no-public"),
                docs_file: std::env::temp_dir().join("mpds-no-docs.md"),
            },
        )
    }

    fn cookie_header(session: &Session) -> String {
        let json = serde_json::to_string(session).unwrap();
        format!("{AUTH_COOKIE}={}", urlencoding::encode(&json))
    }

    async fn session(mpds: &Arc<Mpds>) -> Session {
        let form = LoginForm {
            username: "admin".into(),
            password: "admin".into(),
            remember_me: false,
        };
        mpds.login(&form).await.unwrap().unwrap()
    }

    fn set_cookie<B>(res: &warp::http::Response<B>) -> Option<Cookie<'static>> {
        let header = res.headers().get(header::SET_COOKIE)?.to_str().unwrap();
        Some(Cookie::parse(header.to_string()).unwrap())
    }

    fn location<B>(res: &warp::http::Response<B>) -> &str {
        res.headers()[header::LOCATION].to_str().unwrap()
    }

    fn body_json<B: AsRef<[u8]>>(res: &warp::http::Response<B>) -> Value {
        serde_json::from_slice(res.body().as_ref()).unwrap()
    }

    #[tokio::test]
    async fn login_sets_cookie() {
        let mpds = create_mpds().await;
        let before = Timestamp::now().unwrap();

        let res = request()
            .method("POST")
            .path("/login")
            .header("content-type", FORM)
            .body("username=admin&password=admin")
            .reply(&filter(&mpds))
            .await;

        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert!(location(&res).starts_with("/?msg="));

        let cookie = set_cookie(&res).unwrap();
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(1)));

        let session = Session::from_cookie(cookie.value()).unwrap();
        let expected = before.as_millis() + 3_600_000;
        assert!((session.expires.as_millis() - expected).abs() < 5_000);

        assert_eq!(
            mpds.authenticate(&session.token).await.unwrap(),
            SessionLookup::Valid(session)
        );
    }

    #[tokio::test]
    async fn bad_login() {
        let mpds = create_mpds().await;

        let res = request()
            .method("POST")
            .path("/login")
            .header("content-type", FORM)
            .body("username=admin&password=nope")
            .reply(&filter(&mpds))
            .await;

        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&res),
            Message::error("Invalid username or password.").redirect_url("/login")
        );
        assert!(set_cookie(&res).is_none());

        let res = request()
            .method("POST")
            .path("/login")
            .header("content-type", FORM)
            .body("username=admin")
            .reply(&filter(&mpds))
            .await;
        assert_eq!(
            location(&res),
            Message::warning("Please fill in every field.").redirect_url("/login")
        );
    }

    #[tokio::test]
    async fn admin_requires_session() {
        let mpds = create_mpds().await;

        let res = request().path("/admin").reply(&filter(&mpds)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body = String::from_utf8_lossy(res.body());
        assert!(body.contains("Resource &quot;/admin&quot; is forbidden."));

        let session = session(&mpds).await;
        let res = request()
            .path("/admin")
            .header("cookie", cookie_header(&session))
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(String::from_utf8_lossy(res.body()).contains("Logged in as admin."));
        assert!(set_cookie(&res).is_none());
    }

    #[tokio::test]
    async fn messages_are_shown() {
        let mpds = create_mpds().await;
        let url = Message::info("Hello there").redirect_url("/login");

        let res = request().path(&url).reply(&filter(&mpds)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(String::from_utf8_lossy(res.body())
            .contains(r#"<div class="msg msg-info">Hello there</div>"#));
    }

    #[tokio::test]
    async fn expired_cookie_is_cleared() {
        let mpds = create_mpds().await;
        let stale = Session {
            token: "stale".into(),
            username: "admin".into(),
            expires: Timestamp::from_millis(1),
        };
        mpds.backend()
            .add(SESSIONS, backend::into_row(&stale).unwrap())
            .await
            .unwrap();

        for _ in 0..2 {
            let res = request()
                .path("/admin")
                .header("cookie", cookie_header(&stale))
                .reply(&filter(&mpds))
                .await;

            assert_eq!(res.status(), StatusCode::FORBIDDEN);
            let cookie = set_cookie(&res).unwrap();
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        }

        assert!(mpds.backend().all_entries(SESSIONS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_cookie_is_cleared() {
        let mpds = create_mpds().await;

        let res = request()
            .path("/")
            .header("cookie", format!("{AUTH_COOKIE}=garbage"))
            .reply(&filter(&mpds))
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(set_cookie(&res).unwrap().value(), "");
    }

    #[tokio::test]
    async fn session_storage_failure_is_a_server_error() {
        let mpds = create_mpds().await;
        let session = session(&mpds).await;
        backend::test::corrupt_table(mpds.backend(), SESSIONS).await;

        let res = request()
            .path("/")
            .header("cookie", cookie_header(&session))
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(String::from_utf8_lossy(res.body()).contains("An unknown server error occured."));

        // without a cookie the sessions table isn't read
        let res = request().path("/").reply(&filter(&mpds)).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn docs_page() {
        let mpds = create_mpds().await;

        let res = request().path("/docs").reply(&filter(&mpds)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let dir = std::env::temp_dir().join(format!("mpds-docs-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let docs_file = dir.join("docs.md");
        std::fs::write(&docs_file, "# Usage\n\nRun **mpds**.\n\n<script>alert(1)</script>").unwrap();

        let filter = routes(
            Arc::clone(&mpds),
            Settings {
                secure: false,
                public_dir: dir.clone(),
                docs_file,
            },
        );
        let res = request().path("/docs").reply(&filter).await;
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let html = String::from_utf8_lossy(res.body());
        assert!(html.contains("<title>Modpacker Distro Server Docs</title>"));
        assert!(html.contains("<h1>Usage</h1>"));
        assert!(html.contains("<strong>mpds</strong>"));
        assert!(!html.contains("<script>"));
    }

    #[tokio::test]
    async fn logout() {
        let mpds = create_mpds().await;
        let session = session(&mpds).await;

        let res = request()
            .path("/logout")
            .header("cookie", cookie_header(&session))
            .reply(&filter(&mpds))
            .await;

        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert!(location(&res).starts_with("/login?msg="));
        assert_eq!(set_cookie(&res).unwrap().value(), "");
        assert_eq!(
            mpds.authenticate(&session.token).await.unwrap(),
            SessionLookup::NotFound
        );

        // nothing to do without a session
        let res = request()
            .method("POST")
            .path("/logout")
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/login");
        assert!(set_cookie(&res).is_none());
    }

    #[tokio::test]
    async fn item_editor() {
        let mpds = create_mpds().await;
        let cookie = cookie_header(&session(&mpds).await);

        let items = json!([{
            "project_id": "sodium",
            "project_name": "Sodium",
            "project_source": "modrinth",
            "applied_versions": ["1.20.1"],
        }]);
        let body = format!("items={}", urlencoding::encode(&items.to_string()));

        let res = request()
            .method("POST")
            .path("/admin/modpack/mods/update")
            .header("cookie", &cookie)
            .header("content-type", FORM)
            .body(body)
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&res),
            Message::info("Mods: 1 added, 0 removed, 0 updated.").redirect_url("/admin/modpack/mods")
        );

        let stored = mpds.items(ItemList::Mods).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].project_name, "Sodium");

        let res = request()
            .method("POST")
            .path("/admin/modpack/mods/update")
            .header("cookie", &cookie)
            .header("content-type", FORM)
            .body("items=nope")
            .reply(&filter(&mpds))
            .await;
        assert_eq!(
            location(&res),
            Message::warning("Items must be a JSON list of projects.")
                .redirect_url("/admin/modpack/mods")
        );

        let res = request()
            .path("/admin/modpack/servers")
            .header("cookie", &cookie)
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    fn multipart_body(version: &str, icon: Option<&str>) -> String {
        let mut body = String::new();
        for (name, value) in [("name", "Pack"), ("version", version), ("description", "Hi")] {
            body.push_str(&format!(
                "--XX\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        if let Some(icon) = icon {
            body.push_str(&format!(
                "--XX\r\nContent-Disposition: form-data; name=\"icon\"; filename=\"icon.jpg\"\r\n\
                 Content-Type: image/jpeg\r\n\r\n{icon}\r\n"
            ));
        }
        body.push_str("--XX--\r\n");
        body
    }

    #[tokio::test]
    async fn modpack_update() {
        let mpds = create_mpds().await;
        let cookie = cookie_header(&session(&mpds).await);

        let multipart = |version: &str| multipart_body(version, None);

        let res = request()
            .method("POST")
            .path("/admin/modpack/update")
            .header("cookie", &cookie)
            .header("content-type", "multipart/form-data; boundary=XX")
            .body(multipart("1.0.0"))
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&res),
            Message::info("Modpack Meta Updated!").redirect_url("/admin/modpack")
        );
        assert_eq!(mpds.modpack().await.unwrap().version, "1.0.0");

        let res = request()
            .method("POST")
            .path("/admin/modpack/update")
            .header("cookie", &cookie)
            .header("content-type", "multipart/form-data; boundary=XX")
            .body(multipart("0.9.0"))
            .reply(&filter(&mpds))
            .await;
        assert_eq!(
            location(&res),
            Message::warning("Version must be greater than previous version.")
                .redirect_url("/admin/modpack")
        );
    }

    #[tokio::test]
    async fn modpack_update_with_icon() {
        let mpds = create_mpds().await;
        let cookie = cookie_header(&session(&mpds).await);

        let res = request()
            .method("POST")
            .path("/admin/modpack/update")
            .header("cookie", &cookie)
            .header("content-type", "multipart/form-data; boundary=XX")
            .body(multipart_body("2.0.0", Some("jpeg bytes")))
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);

        let meta = mpds.modpack().await.unwrap();
        assert_eq!(meta.version, "2.0.0");
        assert_eq!(meta.description, "Hi");
        assert_ne!(meta.icon, "temp");

        let res = request()
            .path(&format!("/api/v1/icons/{}", meta.icon))
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(&res.body()[..], b"jpeg bytes");
    }

    #[tokio::test]
    async fn ping() {
        let mpds = create_mpds().await;

        let res = request().path("/api/v1/ping").reply(&filter(&mpds)).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = body_json(&res);
        assert_eq!(body["message"], "APIv1 is working.");
        assert!(body["time"].as_str().unwrap().ends_with(" GMT"));
    }

    #[tokio::test]
    async fn api_modpack_and_items() {
        let mpds = create_mpds().await;

        let res = request().path("/api/v1/modpack").reply(&filter(&mpds)).await;
        assert_eq!(body_json(&res)["icon"], "temp");

        let res = request().path("/api/v1/items/mods").reply(&filter(&mpds)).await;
        assert_eq!(body_json(&res), json!([]));

        let res = request().path("/api/v1/items/nope").reply(&filter(&mpds)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(&res)["status"], 404);

        let res = request().path("/api/v1/nothing").reply(&filter(&mpds)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(&res)["status"], 404);
    }

    #[tokio::test]
    async fn api_servers() {
        let mpds = create_mpds().await;
        let add = "id=main&name=Main&url=mc.example.com&versions=1.20.1";

        let res = request()
            .method("POST")
            .path("/api/v1/servers/add")
            .header("content-type", FORM)
            .body(add)
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(&res)["status"], 403);

        let cookie = cookie_header(&session(&mpds).await);
        let res = request()
            .method("POST")
            .path("/api/v1/servers/add")
            .header("cookie", &cookie)
            .header("content-type", FORM)
            .body(add)
            .reply(&filter(&mpds))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(&res).as_array().unwrap().len(), 1);

        let res = request()
            .path("/api/v1/servers/1.20.1/main")
            .reply(&filter(&mpds))
            .await;
        assert_eq!(body_json(&res)["url"], "mc.example.com");

        let res = request()
            .path("/api/v1/servers/1.19.2")
            .reply(&filter(&mpds))
            .await;
        assert_eq!(body_json(&res), json!([]));

        let res = request()
            .method("POST")
            .path("/api/v1/servers/remove")
            .header("cookie", &cookie)
            .header("content-type", FORM)
            .body("id=main")
            .reply(&filter(&mpds))
            .await;
        assert_eq!(body_json(&res), json!({ "processed": true }));
        assert!(mpds.servers(None).await.unwrap().is_empty());
    }
}
