mod common;

use common::{data, dec_of, error_kind, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

/// Creates a posted invoice with a single 200.00 service line.
async fn posted_invoice(app: &TestApp, tenant: Uuid) -> String {
    let (_, body) = app
        .post(
            "/api/v1/invoices",
            tenant,
            json!({ "patient_id": Uuid::new_v4(), "currency": "USD" }),
        )
        .await;
    let invoice_id = data(&body)["id"].as_str().unwrap().to_string();

    app.post(
        &format!("/api/v1/invoices/{}/lines", invoice_id),
        tenant,
        json!({
            "kind": "service",
            "description": "Surgery",
            "quantity": 1,
            "unit_price": "200"
        }),
    )
    .await;

    let (status, _) = app
        .post_empty(&format!("/api/v1/invoices/{}/post", invoice_id), tenant)
        .await;
    assert_eq!(status, 200);
    invoice_id
}

#[tokio::test]
async fn partial_payments_accumulate_until_paid() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;
    let invoice_id = posted_invoice(&app, tenant).await;

    let (status, body) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", invoice_id),
            tenant,
            json!({ "amount": "120", "method": "card" }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(data(&body)["invoice_status"], "posted");
    assert_eq!(dec_of(&data(&body)["outstanding"]), dec!(80));

    let (_, body) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", invoice_id),
            tenant,
            json!({ "amount": "80", "method": "cash" }),
        )
        .await;
    assert_eq!(data(&body)["invoice_status"], "paid");
    assert_eq!(dec_of(&data(&body)["outstanding"]), dec!(0));
}

#[tokio::test]
async fn retrying_a_payment_with_the_same_key_applies_it_once() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;
    let invoice_id = posted_invoice(&app, tenant).await;

    let payment = json!({
        "amount": "120",
        "method": "card",
        "idempotency_key": "txn-20260828-001"
    });
    let (status, first) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", invoice_id),
            tenant,
            payment.clone(),
        )
        .await;
    assert_eq!(status, 201);

    // A timed-out caller retries with the same key and gets the original
    // payment back; nothing is applied twice.
    let (status, second) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", invoice_id),
            tenant,
            payment,
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(data(&second)["id"], data(&first)["id"]);
    assert_eq!(dec_of(&data(&second)["outstanding"]), dec!(80));

    let (_, listed) = app
        .get(&format!("/api/v1/invoices/{}/payments", invoice_id), tenant)
        .await;
    assert_eq!(data(&listed).as_array().unwrap().len(), 1);

    // A fresh key records a fresh payment.
    let (_, body) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", invoice_id),
            tenant,
            json!({
                "amount": "80",
                "method": "card",
                "idempotency_key": "txn-20260828-002"
            }),
        )
        .await;
    assert_eq!(data(&body)["invoice_status"], "paid");
}

#[tokio::test]
async fn overpayment_is_flagged_as_credit() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;
    let invoice_id = posted_invoice(&app, tenant).await;

    let (status, body) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", invoice_id),
            tenant,
            json!({ "amount": "250", "method": "card" }),
        )
        .await;
    assert_eq!(status, 201);
    let payment = data(&body);
    assert_eq!(payment["invoice_status"], "paid");
    assert_eq!(dec_of(&payment["outstanding"]), dec!(0));
    assert_eq!(dec_of(&payment["credit_balance"]), dec!(50));
}

#[tokio::test]
async fn payments_require_a_posted_invoice() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;

    let (_, body) = app
        .post(
            "/api/v1/invoices",
            tenant,
            json!({ "patient_id": Uuid::new_v4(), "currency": "USD" }),
        )
        .await;
    let draft_id = data(&body)["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", draft_id),
            tenant,
            json!({ "amount": "10", "method": "cash" }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(error_kind(&body), "invalid_state");
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;
    let invoice_id = posted_invoice(&app, tenant).await;

    for amount in ["0", "-5"] {
        let (status, body) = app
            .post(
                &format!("/api/v1/invoices/{}/payments", invoice_id),
                tenant,
                json!({ "amount": amount, "method": "cash" }),
            )
            .await;
        assert_eq!(status, 422);
        assert_eq!(error_kind(&body), "validation");
    }
}

#[tokio::test]
async fn reversal_reopens_a_paid_invoice() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;
    let invoice_id = posted_invoice(&app, tenant).await;

    let (_, body) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", invoice_id),
            tenant,
            json!({ "amount": "200", "method": "card" }),
        )
        .await;
    let payment_id = data(&body)["id"].as_str().unwrap().to_string();
    assert_eq!(data(&body)["invoice_status"], "paid");

    let (status, body) = app
        .post_empty(&format!("/api/v1/payments/{}/reverse", payment_id), tenant)
        .await;
    assert_eq!(status, 201);
    let reversal = data(&body);
    assert_eq!(dec_of(&reversal["amount"]), dec!(-200));
    assert_eq!(reversal["reversal_of"].as_str(), Some(payment_id.as_str()));
    assert_eq!(reversal["invoice_status"], "posted");
    assert_eq!(dec_of(&reversal["outstanding"]), dec!(200));

    // Both rows remain on the ledger
    let (_, body) = app
        .get(&format!("/api/v1/invoices/{}/payments", invoice_id), tenant)
        .await;
    assert_eq!(data(&body).as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn a_payment_cannot_be_reversed_twice() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;
    let invoice_id = posted_invoice(&app, tenant).await;

    let (_, body) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", invoice_id),
            tenant,
            json!({ "amount": "200", "method": "card" }),
        )
        .await;
    let payment_id = data(&body)["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post_empty(&format!("/api/v1/payments/{}/reverse", payment_id), tenant)
        .await;
    assert_eq!(status, 201);
    let reversal_id = data(&body)["id"].as_str().unwrap().to_string();

    // Second reversal of the original
    let (status, body) = app
        .post_empty(&format!("/api/v1/payments/{}/reverse", payment_id), tenant)
        .await;
    assert_eq!(status, 409);
    assert_eq!(error_kind(&body), "invalid_state");

    // Reversing the reversal itself
    let (status, body) = app
        .post_empty(&format!("/api/v1/payments/{}/reverse", reversal_id), tenant)
        .await;
    assert_eq!(status, 409);
    assert_eq!(error_kind(&body), "invalid_state");
}
