//! Statically enumerated command/response types, one module per service.
//!
//! A command type carries its wire name and its success-response type;
//! dispatch tables and the typed client are generic over this trait, so
//! no dynamic casting happens at runtime.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::wire::Wire;

pub mod audio;
pub mod events;
pub mod osman;
pub mod server;
pub mod ui;

/// A command in some service's table.
///
/// `NAME` is unique within the owning service. `Okay` is the payload of a
/// successful response; failures are always [`ApiError`](crate::ApiError).
pub trait ApiCommand: Wire + Serialize + DeserializeOwned + Send + 'static {
    const NAME: &'static str;
    type Okay: Wire + Serialize + DeserializeOwned + Send + 'static;
}

/// A push event broadcast with correlation id 0.
pub trait ApiEvent: Wire + Serialize + DeserializeOwned + Send + 'static {
    const NAME: &'static str;
}

/// Commands every service answers regardless of state.
pub mod global {
    use serde::{Deserialize, Serialize};

    use super::ApiCommand;
    use crate::impl_wire;

    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct QuitApplication {}
    impl_wire!(QuitApplication {});
    impl ApiCommand for QuitApplication {
        const NAME: &'static str = "QuitApplication";
        type Okay = ();
    }

    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct GetFps {}
    impl_wire!(GetFps {});

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    pub struct FpsOkay {
        pub fps: f64,
    }
    impl_wire!(FpsOkay { fps });

    impl ApiCommand for GetFps {
        const NAME: &'static str = "GetFps";
        type Okay = FpsOkay;
    }

    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct StateGet {}
    impl_wire!(StateGet {});

    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct StateOkay {
        pub state: String,
    }
    impl_wire!(StateOkay { state });

    impl ApiCommand for StateGet {
        const NAME: &'static str = "StateGet";
        type Okay = StateOkay;
    }
}
