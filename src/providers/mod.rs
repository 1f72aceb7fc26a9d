mod fitbit;
mod traits;

pub use fitbit::FitbitClient;
pub use traits::OAuthClient;
