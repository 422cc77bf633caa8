//! Concrete fetch strategies. Free providers (`http`, `flaresolverr`,
//! `headless`) and paid providers (`brightdata`, `scraping_browser`,
//! `twocaptcha_proxy`) all implement [`crate::FetchProvider`]; the
//! orchestrator is the only thing that knows their cost-ordering.

pub mod brightdata;
pub mod flaresolverr;
pub mod headless;
pub mod http;
pub mod scraping_browser;
pub mod twocaptcha_proxy;

pub use brightdata::BrightdataProvider;
pub use flaresolverr::FlaresolverrProvider;
pub use headless::HeadlessProvider;
pub use http::HttpProvider;
pub use scraping_browser::ScrapingBrowserProvider;
pub use twocaptcha_proxy::TwoCaptchaProxyProvider;
