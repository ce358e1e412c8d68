use std::fmt;
use std::sync::OnceLock;

use crate::auth::{AuthState, Role};

/// Top-level route trees, one per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    Admin,
    Guru,
    WaliKelas,
}

impl Area {
    fn prefix(self) -> &'static str {
        match self {
            Area::Admin => "/admin",
            Area::Guru => "/guru",
            Area::WaliKelas => "/wali-kelas",
        }
    }

    fn admits(self, role: &Role) -> bool {
        match (self, role) {
            (Area::Admin, Role::Admin) => true,
            (Area::Guru, Role::GuruBk) => true,
            (Area::WaliKelas, Role::WaliKelas) => true,
            (_, Role::Admin | Role::GuruBk | Role::WaliKelas | Role::Unknown(_)) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Dashboard,
    AddViolation,
    EditViolation(i64),
    Monitoring,
    Reports,
    Students,
    Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    /// Role redirector; also the landing route for accounts without a
    /// recognised role.
    Dashboard,
    /// Own account page, reachable with or without a recognised role.
    Profile,
    Area(Area, Page),
    NotFound(String),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::Profile => "/profile".to_string(),
            Route::Area(area, page) => {
                let tail = match page {
                    Page::Dashboard => "dashboard".to_string(),
                    Page::AddViolation => "add-violation".to_string(),
                    Page::EditViolation(id) => format!("edit-violation/{id}"),
                    Page::Monitoring => "monitoring".to_string(),
                    Page::Reports => "reports".to_string(),
                    Page::Students => "students".to_string(),
                    Page::Profile => "profile".to_string(),
                };
                format!("{}/{}", area.prefix(), tail)
            }
            Route::NotFound(path) => path.clone(),
        }
    }

    pub fn parse(path: &str) -> Route {
        if path == "/" {
            return Route::Login;
        }
        let Ok(matched) = router().at(path) else {
            return Route::NotFound(path.to_string());
        };
        match *matched.value {
            Template::Login => Route::Login,
            Template::Dashboard => Route::Dashboard,
            Template::Profile => Route::Profile,
            Template::Page(area, PageKind::Edit) => match matched
                .params
                .get("id")
                .and_then(|id| id.parse::<i64>().ok())
            {
                Some(id) => Route::Area(area, Page::EditViolation(id)),
                None => Route::NotFound(path.to_string()),
            },
            Template::Page(area, PageKind::Fixed(page)) => Route::Area(area, page),
        }
    }

    /// Screen rendered by this route, if it is a protected page.
    pub fn screen(&self) -> Option<Screen> {
        match self {
            Route::Area(Area::WaliKelas, Page::Dashboard) => Some(Screen::HomeroomDashboard),
            Route::Area(_, page) => Some(match page {
                Page::Dashboard => Screen::DashboardStats,
                Page::AddViolation => Screen::AddViolation,
                Page::EditViolation(_) => Screen::EditViolation,
                Page::Monitoring => Screen::Monitoring,
                Page::Reports => Screen::Reports,
                Page::Students => Screen::Students,
                Page::Profile => Screen::Profile,
            }),
            Route::Dashboard => Some(Screen::GenericDashboard),
            Route::Profile => Some(Screen::Profile),
            Route::Login | Route::NotFound(_) => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, Copy)]
enum PageKind {
    Fixed(Page),
    Edit,
}

#[derive(Debug, Clone, Copy)]
enum Template {
    Login,
    Dashboard,
    Profile,
    Page(Area, PageKind),
}

const AREA_PAGES: &[(Area, &[(&str, PageKind)])] = &[
    (
        Area::Admin,
        &[
            ("dashboard", PageKind::Fixed(Page::Dashboard)),
            ("add-violation", PageKind::Fixed(Page::AddViolation)),
            ("edit-violation/{id}", PageKind::Edit),
            ("monitoring", PageKind::Fixed(Page::Monitoring)),
            ("reports", PageKind::Fixed(Page::Reports)),
            ("students", PageKind::Fixed(Page::Students)),
            ("profile", PageKind::Fixed(Page::Profile)),
        ],
    ),
    (
        Area::Guru,
        &[
            ("dashboard", PageKind::Fixed(Page::Dashboard)),
            ("add-violation", PageKind::Fixed(Page::AddViolation)),
            ("monitoring", PageKind::Fixed(Page::Monitoring)),
            ("students", PageKind::Fixed(Page::Students)),
            ("profile", PageKind::Fixed(Page::Profile)),
        ],
    ),
    (
        Area::WaliKelas,
        &[
            ("dashboard", PageKind::Fixed(Page::Dashboard)),
            ("students", PageKind::Fixed(Page::Students)),
            ("profile", PageKind::Fixed(Page::Profile)),
        ],
    ),
];

fn router() -> &'static matchit::Router<Template> {
    static ROUTER: OnceLock<matchit::Router<Template>> = OnceLock::new();
    ROUTER.get_or_init(|| {
        let mut router = matchit::Router::new();
        let mut add = |path: String, template: Template| {
            if let Err(err) = router.insert(path.clone(), template) {
                tracing::error!(%path, error = %err, "route table conflict");
            }
        };
        add("/login".to_string(), Template::Login);
        add("/dashboard".to_string(), Template::Dashboard);
        add("/profile".to_string(), Template::Profile);
        for (area, pages) in AREA_PAGES {
            for (tail, kind) in *pages {
                add(format!("{}/{}", area.prefix(), tail), Template::Page(*area, *kind));
            }
        }
        router
    })
}

/// Landing page after sign-in. Accounts without a recognised role go to the
/// generic dashboard instead of failing.
pub fn landing_route(role: Option<&Role>) -> Route {
    match role {
        Some(Role::Admin) => Route::Area(Area::Admin, Page::Dashboard),
        Some(Role::GuruBk) => Route::Area(Area::Guru, Page::Dashboard),
        Some(Role::WaliKelas) => Route::Area(Area::WaliKelas, Page::Students),
        Some(Role::Unknown(name)) => {
            tracing::warn!(role = %name, "unknown role, using generic dashboard");
            Route::Dashboard
        }
        None => Route::Dashboard,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Identity still resolving: show a waiting indicator, nothing else.
    Wait,
    Render,
    RedirectToLogin,
}

pub fn guard(state: &AuthState) -> GuardDecision {
    match state {
        AuthState::Loading => GuardDecision::Wait,
        AuthState::Unauthenticated => GuardDecision::RedirectToLogin,
        AuthState::Authenticated(_) => GuardDecision::Render,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    Wait,
    Navigate(Route),
}

pub fn redirect(state: &AuthState) -> RedirectDecision {
    match state {
        AuthState::Loading => RedirectDecision::Wait,
        AuthState::Unauthenticated => RedirectDecision::Navigate(Route::Login),
        AuthState::Authenticated(principal) => {
            RedirectDecision::Navigate(landing_route(principal.role.as_ref()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    GenericDashboard,
    DashboardStats,
    HomeroomDashboard,
    Monitoring,
    AddViolation,
    EditViolation,
    Reports,
    Students,
    Profile,
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Screen::GenericDashboard => "dashboard",
            Screen::DashboardStats => "dashboard statistics",
            Screen::HomeroomDashboard => "homeroom dashboard",
            Screen::Monitoring => "monitoring",
            Screen::AddViolation => "add violation",
            Screen::EditViolation => "edit violation",
            Screen::Reports => "reports",
            Screen::Students => "student data",
            Screen::Profile => "profile",
        };
        f.write_str(name)
    }
}

/// Whether a signed-in account may see `screen`.
pub fn authorize(role: Option<&Role>, screen: Screen) -> bool {
    let open_to_all = matches!(screen, Screen::GenericDashboard | Screen::Profile);
    match role {
        Some(Role::Admin) => !matches!(screen, Screen::HomeroomDashboard),
        Some(Role::GuruBk) => {
            open_to_all
                || matches!(
                    screen,
                    Screen::DashboardStats
                        | Screen::Monitoring
                        | Screen::AddViolation
                        | Screen::Students
                )
        }
        Some(Role::WaliKelas) => {
            open_to_all || matches!(screen, Screen::HomeroomDashboard | Screen::Students)
        }
        Some(Role::Unknown(_)) | None => open_to_all,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Wait,
    ShowLogin,
    RedirectToLogin,
    Redirect(Route),
    Render(Screen),
    /// Rendered in place as an "access denied" panel, not a redirect.
    Denied(Screen),
    NotFound,
}

/// Resolves what opening `route` shows for the current session.
pub fn navigate(state: &AuthState, route: &Route) -> Navigation {
    match route {
        Route::Login => {
            return match redirect(state) {
                RedirectDecision::Wait => Navigation::Wait,
                RedirectDecision::Navigate(Route::Login) => Navigation::ShowLogin,
                RedirectDecision::Navigate(landing) => Navigation::Redirect(landing),
            }
        }
        Route::NotFound(_) => return Navigation::NotFound,
        Route::Dashboard | Route::Profile | Route::Area(..) => {}
    }

    let principal = match (guard(state), state.principal()) {
        (GuardDecision::Wait, _) => return Navigation::Wait,
        (GuardDecision::RedirectToLogin, _) | (GuardDecision::Render, None) => {
            return Navigation::RedirectToLogin
        }
        (GuardDecision::Render, Some(principal)) => principal,
    };
    let role = principal.role.as_ref();

    if let Route::Dashboard = route {
        let landing = landing_route(role);
        return if landing == Route::Dashboard {
            Navigation::Render(Screen::GenericDashboard)
        } else {
            Navigation::Redirect(landing)
        };
    }

    let Some(screen) = route.screen() else {
        return Navigation::NotFound;
    };
    let area_ok = match (route, role) {
        (Route::Profile, _) => true,
        (Route::Area(area, _), Some(role)) => area.admits(role),
        _ => false,
    };
    if area_ok && authorize(role, screen) {
        Navigation::Render(screen)
    } else {
        Navigation::Denied(screen)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::auth::Principal;
    use crate::models::UserIdentity;

    fn signed_in(role: Option<Role>) -> AuthState {
        AuthState::Authenticated(Principal {
            user: UserIdentity {
                id: Uuid::new_v4(),
                email: "staf@sekolah.id".to_string(),
                display_name: None,
            },
            role,
            homeroom: None,
        })
    }

    #[test]
    fn landing_routes_follow_fixed_table() {
        assert_eq!(landing_route(Some(&Role::Admin)).path(), "/admin/dashboard");
        assert_eq!(landing_route(Some(&Role::GuruBk)).path(), "/guru/dashboard");
        assert_eq!(landing_route(Some(&Role::WaliKelas)).path(), "/wali-kelas/students");
        assert_eq!(
            landing_route(Some(&Role::Unknown("tamu".to_string()))),
            Route::Dashboard
        );
        assert_eq!(landing_route(None).path(), "/dashboard");
    }

    #[test]
    fn guard_waits_while_loading_and_redirects_after() {
        assert_eq!(guard(&AuthState::Loading), GuardDecision::Wait);
        assert_eq!(guard(&AuthState::Unauthenticated), GuardDecision::RedirectToLogin);
        assert_eq!(guard(&signed_in(None)), GuardDecision::Render);

        let route = Route::parse("/admin/monitoring");
        assert_eq!(navigate(&AuthState::Loading, &route), Navigation::Wait);
        assert_eq!(
            navigate(&AuthState::Unauthenticated, &route),
            Navigation::RedirectToLogin
        );
    }

    #[test]
    fn redirector_sends_signed_out_users_to_login() {
        assert_eq!(redirect(&AuthState::Loading), RedirectDecision::Wait);
        assert_eq!(
            redirect(&AuthState::Unauthenticated),
            RedirectDecision::Navigate(Route::Login)
        );
        assert_eq!(
            redirect(&signed_in(Some(Role::WaliKelas))),
            RedirectDecision::Navigate(Route::Area(Area::WaliKelas, Page::Students))
        );
    }

    #[test]
    fn paths_parse_and_print_symmetrically() {
        for path in [
            "/login",
            "/dashboard",
            "/profile",
            "/admin/edit-violation/42",
            "/guru/add-violation",
            "/wali-kelas/profile",
        ] {
            assert_eq!(Route::parse(path).path(), path);
        }
        assert_eq!(Route::parse("/"), Route::Login);
        assert_eq!(
            Route::parse("/admin/edit-violation/abc"),
            Route::NotFound("/admin/edit-violation/abc".to_string())
        );
        assert_eq!(
            Route::parse("/guru/reports"),
            Route::NotFound("/guru/reports".to_string())
        );
    }

    #[test]
    fn screens_denied_in_place_for_insufficient_roles() {
        let guru = signed_in(Some(Role::GuruBk));
        assert_eq!(
            navigate(&guru, &Route::parse("/guru/monitoring")),
            Navigation::Render(Screen::Monitoring)
        );
        assert_eq!(
            navigate(&guru, &Route::parse("/admin/reports")),
            Navigation::Denied(Screen::Reports)
        );

        let wali = signed_in(Some(Role::WaliKelas));
        assert_eq!(
            navigate(&wali, &Route::parse("/wali-kelas/dashboard")),
            Navigation::Render(Screen::HomeroomDashboard)
        );
        assert_eq!(
            navigate(&wali, &Route::parse("/guru/monitoring")),
            Navigation::Denied(Screen::Monitoring)
        );
    }

    #[test]
    fn dashboard_redirects_by_role_or_renders_fallback() {
        assert_eq!(
            navigate(&signed_in(Some(Role::Admin)), &Route::Dashboard),
            Navigation::Redirect(Route::Area(Area::Admin, Page::Dashboard))
        );
        assert_eq!(
            navigate(&signed_in(Some(Role::Unknown("tamu".to_string()))), &Route::Dashboard),
            Navigation::Render(Screen::GenericDashboard)
        );
        assert_eq!(
            navigate(&signed_in(None), &Route::Login),
            Navigation::Redirect(Route::Dashboard)
        );
        assert_eq!(
            navigate(&AuthState::Unauthenticated, &Route::Login),
            Navigation::ShowLogin
        );
    }

    #[test]
    fn authorization_matrix() {
        let admin = Some(&Role::Admin);
        let guru = Some(&Role::GuruBk);
        let wali = Some(&Role::WaliKelas);
        let unknown = Role::Unknown("tamu".to_string());

        assert!(authorize(admin, Screen::Reports));
        assert!(authorize(admin, Screen::EditViolation));
        assert!(!authorize(admin, Screen::HomeroomDashboard));
        assert!(authorize(guru, Screen::Monitoring));
        assert!(!authorize(guru, Screen::Reports));
        assert!(!authorize(guru, Screen::EditViolation));
        assert!(authorize(wali, Screen::Students));
        assert!(!authorize(wali, Screen::AddViolation));
        assert!(authorize(Some(&unknown), Screen::Profile));
        assert!(!authorize(Some(&unknown), Screen::Students));
        assert!(!authorize(None, Screen::Monitoring));
    }

    #[test]
    fn profile_is_reachable_without_a_role() {
        let profile = Route::parse("/profile");
        assert_eq!(profile, Route::Profile);
        for role in [None, Some(Role::Unknown("tamu".to_string())), Some(Role::GuruBk)] {
            assert_eq!(
                navigate(&signed_in(role), &profile),
                Navigation::Render(Screen::Profile)
            );
        }
        assert_eq!(
            navigate(&signed_in(None), &Route::parse("/admin/profile")),
            Navigation::Denied(Screen::Profile)
        );
        assert_eq!(
            navigate(&AuthState::Unauthenticated, &profile),
            Navigation::RedirectToLogin
        );
    }
}
