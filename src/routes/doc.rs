use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{AddToCartRequest, CartDto, CartItemDto, UpdateCartItemRequest},
        orders::{
            OrderList, OrderWithItems, PayOrderRequest, PaymentIntentDto, QuotationStatusDto,
            VerifyPaymentRequest,
        },
        vendor::VendorOrderList,
    },
    models::{Order, OrderItem, OrderStatus, PricingPeriod, Product, User},
    response::{ApiResponse, Meta},
    routes::{cart, health, orders, params, vendor},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        orders::list_orders,
        orders::get_order,
        orders::submit_quotation,
        orders::quotation_status,
        orders::pay_order,
        orders::verify_payment,
        vendor::list_quotations,
        vendor::approve_quotation,
        vendor::reject_quotation,
    ),
    components(
        schemas(
            User,
            Product,
            Order,
            OrderItem,
            OrderStatus,
            PricingPeriod,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartDto,
            CartItemDto,
            OrderList,
            OrderWithItems,
            QuotationStatusDto,
            PayOrderRequest,
            PaymentIntentDto,
            VerifyPaymentRequest,
            VendorOrderList,
            params::Pagination,
            params::SortOrder,
            params::OrderListQuery,
            params::VendorQuotationQuery,
            Meta,
            ApiResponse<CartDto>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<QuotationStatusDto>,
            ApiResponse<PaymentIntentDto>,
            ApiResponse<VendorOrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Draft order (cart) endpoints"),
        (name = "Orders", description = "Order lifecycle and payment endpoints"),
        (name = "Vendor", description = "Vendor quotation endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
