use serde::{Deserialize, Serialize};

/// Which side of a ride this client participates as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Rider,
}

impl Role {
    /// The screen a participant lands on when a ride ends.
    pub fn home(self) -> Route {
        match self {
            Role::Customer => Route::CustomerHome,
            Role::Rider => Route::RiderHome,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Rider => "rider",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "rider" => Ok(Role::Rider),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Navigation targets the sync flow can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    RoleSelection,
    CustomerHome,
    RiderHome,
}
