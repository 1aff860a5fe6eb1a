mod common;

use assert_matches::assert_matches;
use common::TestApp;
use duka_api::{
    errors::ServiceError,
    services::{cart::AddToCartInput, inventory::StockRef},
};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn add_input(product_id: Uuid, quantity: i32) -> AddToCartInput {
    AddToCartInput {
        product_id,
        quantity,
        size: None,
        color: None,
    }
}

#[tokio::test]
async fn add_item_reserves_stock() {
    let app = TestApp::new().await;
    let product = app.seed_product("Kettle", dec!(2500), dec!(0), 10).await;
    let customer = Uuid::new_v4();

    let item = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, 3))
        .await
        .expect("add to cart");

    assert_eq!(item.quantity, 3);
    assert_eq!(app.reload_product(product.id).await.quantity, 7);
}

#[tokio::test]
async fn adding_same_product_merges_lines() {
    let app = TestApp::new().await;
    let product = app.seed_product("Mug", dec!(300), dec!(0), 10).await;
    let customer = Uuid::new_v4();

    let first = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, 2))
        .await
        .unwrap();
    let second = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, 1))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.quantity, 3);

    let cart = app
        .state
        .services
        .cart
        .get_or_create_cart(customer)
        .await
        .unwrap();
    let view = app
        .state
        .services
        .cart
        .get_cart_with_items(cart.id)
        .await
        .unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(app.reload_product(product.id).await.quantity, 7);
}

#[tokio::test]
async fn add_item_rejects_insufficient_stock() {
    let app = TestApp::new().await;
    let product = app.seed_product("Lamp", dec!(1200), dec!(0), 2).await;
    let customer = Uuid::new_v4();

    let result = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, 3))
        .await;

    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
    // Nothing committed: stock and cart untouched.
    assert_eq!(app.reload_product(product.id).await.quantity, 2);
    let cart = app
        .state
        .services
        .cart
        .get_or_create_cart(customer)
        .await
        .unwrap();
    let view = app
        .state
        .services
        .cart
        .get_cart_with_items(cart.id)
        .await
        .unwrap();
    assert!(view.lines.is_empty());
}

#[tokio::test]
async fn add_item_rejects_non_positive_quantity() {
    let app = TestApp::new().await;
    let product = app.seed_product("Plate", dec!(150), dec!(0), 5).await;
    let customer = Uuid::new_v4();

    let result = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, 0))
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let result = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, -4))
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn second_customer_cannot_oversell_the_last_unit() {
    let app = TestApp::new().await;
    let product = app.seed_product("Radio", dec!(4000), dec!(0), 1).await;

    let first = app
        .state
        .services
        .cart
        .add_item(Uuid::new_v4(), add_input(product.id, 1))
        .await;
    assert!(first.is_ok());
    assert_eq!(app.reload_product(product.id).await.quantity, 0);

    let second = app
        .state
        .services
        .cart
        .add_item(Uuid::new_v4(), add_input(product.id, 1))
        .await;
    assert_matches!(second, Err(ServiceError::InsufficientStock(_)));
    assert_eq!(app.reload_product(product.id).await.quantity, 0);
}

#[tokio::test]
async fn update_quantity_adjusts_stock_by_delta() {
    let app = TestApp::new().await;
    let product = app.seed_product("Blender", dec!(5500), dec!(0), 10).await;
    let customer = Uuid::new_v4();

    let item = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, 2))
        .await
        .unwrap();
    let cart_id = item.cart_id;

    // Increase by 3
    let item = app
        .state
        .services
        .cart
        .update_item_quantity(cart_id, item.id, 5)
        .await
        .unwrap();
    assert_eq!(item.quantity, 5);
    assert_eq!(app.reload_product(product.id).await.quantity, 5);

    // Decrease back to 1
    let item = app
        .state
        .services
        .cart
        .update_item_quantity(cart_id, item.id, 1)
        .await
        .unwrap();
    assert_eq!(item.quantity, 1);
    assert_eq!(app.reload_product(product.id).await.quantity, 9);
}

#[tokio::test]
async fn update_quantity_beyond_availability_fails_cleanly() {
    let app = TestApp::new().await;
    let product = app.seed_product("Iron", dec!(1800), dec!(0), 4).await;
    let customer = Uuid::new_v4();

    let item = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, 2))
        .await
        .unwrap();

    // 2 remain in stock; going from 2 to 6 needs 4 more.
    let result = app
        .state
        .services
        .cart
        .update_item_quantity(item.cart_id, item.id, 6)
        .await;

    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
    // Rolled back: quantity and stock unchanged.
    assert_eq!(app.reload_product(product.id).await.quantity, 2);
    let view = app
        .state
        .services
        .cart
        .get_cart_with_items(item.cart_id)
        .await
        .unwrap();
    assert_eq!(view.lines[0].item.quantity, 2);
}

#[tokio::test]
async fn remove_item_returns_stock() {
    let app = TestApp::new().await;
    let product = app.seed_product("Heater", dec!(3200), dec!(0), 6).await;
    let customer = Uuid::new_v4();

    let item = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, 4))
        .await
        .unwrap();
    assert_eq!(app.reload_product(product.id).await.quantity, 2);

    app.state
        .services
        .cart
        .remove_item(item.cart_id, item.id)
        .await
        .unwrap();

    assert_eq!(app.reload_product(product.id).await.quantity, 6);
    let view = app
        .state
        .services
        .cart
        .get_cart_with_items(item.cart_id)
        .await
        .unwrap();
    assert!(view.lines.is_empty());
}

#[tokio::test]
async fn variant_reservation_narrows_both_rows() {
    let app = TestApp::new().await;
    let product = app.seed_product("T-Shirt", dec!(900), dec!(0), 20).await;
    let variant = app
        .seed_variant(&product, "M", "blue", 5, None)
        .await;
    let customer = Uuid::new_v4();

    let input = AddToCartInput {
        product_id: product.id,
        quantity: 2,
        size: Some("M".to_string()),
        color: Some("blue".to_string()),
    };
    let item = app
        .state
        .services
        .cart
        .add_item(customer, input)
        .await
        .unwrap();

    assert_eq!(item.variant_id, Some(variant.id));
    assert_eq!(app.reload_variant(variant.id).await.stock, 3);
    assert_eq!(app.reload_product(product.id).await.quantity, 18);
    assert_eq!(
        app.state
            .services
            .inventory
            .availability(StockRef::Variant {
                product_id: product.id,
                variant_id: variant.id,
            })
            .await
            .unwrap(),
        3
    );

    app.state
        .services
        .cart
        .remove_item(item.cart_id, item.id)
        .await
        .unwrap();
    assert_eq!(app.reload_variant(variant.id).await.stock, 5);
    assert_eq!(app.reload_product(product.id).await.quantity, 20);
}

#[tokio::test]
async fn variant_stock_limit_applies_even_with_product_stock_left() {
    let app = TestApp::new().await;
    let product = app.seed_product("Hoodie", dec!(2200), dec!(0), 50).await;
    let _variant = app.seed_variant(&product, "S", "red", 1, None).await;
    let customer = Uuid::new_v4();

    let input = AddToCartInput {
        product_id: product.id,
        quantity: 2,
        size: Some("S".to_string()),
        color: Some("red".to_string()),
    };

    let result = app.state.services.cart.add_item(customer, input).await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
    assert_eq!(app.reload_product(product.id).await.quantity, 50);
}

#[tokio::test]
async fn unknown_variant_selection_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Cap", dec!(700), dec!(0), 10).await;
    let _variant = app.seed_variant(&product, "M", "black", 5, None).await;

    let input = AddToCartInput {
        product_id: product.id,
        quantity: 1,
        size: Some("XXL".to_string()),
        color: Some("green".to_string()),
    };

    let result = app.state.services.cart.add_item(Uuid::new_v4(), input).await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn cart_total_uses_discounted_and_variant_prices() {
    let app = TestApp::new().await;
    // 1000 KES at 10% off -> 900 each
    let discounted = app.seed_product("Shoes", dec!(1000), dec!(10), 10).await;
    // Variant price override 1500
    let varianted = app.seed_product("Jacket", dec!(1200), dec!(0), 10).await;
    let _variant = app
        .seed_variant(&varianted, "L", "grey", 5, Some(dec!(1500)))
        .await;
    let customer = Uuid::new_v4();

    app.state
        .services
        .cart
        .add_item(customer, add_input(discounted.id, 2))
        .await
        .unwrap();
    app.state
        .services
        .cart
        .add_item(
            customer,
            AddToCartInput {
                product_id: varianted.id,
                quantity: 1,
                size: Some("L".to_string()),
                color: Some("grey".to_string()),
            },
        )
        .await
        .unwrap();

    let cart = app
        .state
        .services
        .cart
        .get_or_create_cart(customer)
        .await
        .unwrap();
    let view = app
        .state
        .services
        .cart
        .get_cart_with_items(cart.id)
        .await
        .unwrap();

    // 2 x 900 + 1 x 1500
    assert_eq!(view.total, dec!(3300.00));
}

#[tokio::test]
async fn stock_is_conserved_across_cart_operations() {
    let app = TestApp::new().await;
    let initial = 12;
    let product = app.seed_product("Thermos", dec!(800), dec!(0), initial).await;
    let customer = Uuid::new_v4();

    let item = app
        .state
        .services
        .cart
        .add_item(customer, add_input(product.id, 5))
        .await
        .unwrap();

    let in_stock = app.reload_product(product.id).await.quantity;
    assert_eq!(in_stock + item.quantity, initial);

    let item = app
        .state
        .services
        .cart
        .update_item_quantity(item.cart_id, item.id, 2)
        .await
        .unwrap();
    let in_stock = app.reload_product(product.id).await.quantity;
    assert_eq!(in_stock + item.quantity, initial);

    app.state
        .services
        .cart
        .remove_item(item.cart_id, item.id)
        .await
        .unwrap();
    assert_eq!(app.reload_product(product.id).await.quantity, initial);
}
