//! OpenAPI/Utoipa configuration.

use crate::api::{health::MISC_TAG, session::SESSION_TAG, token::TOKEN_TAG};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some("Access JWT obtained from `/v1/oauth/token`."))
                .build();
            components.add_security_scheme("Bearer", SecurityScheme::Http(bearer));

            let basic = HttpBuilder::new()
                .scheme(HttpAuthScheme::Basic)
                .description(Some("Registered client id and secret."))
                .build();
            components.add_security_scheme("ClientCredentials", SecurityScheme::Http(basic));

            components.add_security_scheme(
                "JwtCookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("jwt_token"))),
            );
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Mesh Auth API",
        version = "1.0.0",
        description = "Identity and token issuance for users and backend services."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = SESSION_TAG, description = "Signup, signin, service authentication and signout"),
        (name = TOKEN_TAG, description = "Token exchange, refresh and validation")
    )
)]
pub struct ApiDoc;
