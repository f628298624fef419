mod common;

use common::{data, dec_of, error_kind, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

/// Full happy path: draft with one stockable line, post, pay in full, void.
#[tokio::test]
async fn invoice_lifecycle_draft_post_pay_void() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;
    let product = app.seed_product(tenant, "AMX-500", true, dec!(100)).await;

    // Draft
    let (status, body) = app
        .post(
            "/api/v1/invoices",
            tenant,
            json!({ "patient_id": Uuid::new_v4(), "currency": "USD" }),
        )
        .await;
    assert_eq!(status, 201);
    let invoice = data(&body);
    let invoice_id = invoice["id"].as_str().unwrap().to_string();
    assert_eq!(invoice["status"], "draft");
    assert!(invoice["invoice_number"].is_null());

    // Add a line: 3 x 100.00 with 54.00 tax
    let (status, body) = app
        .post(
            &format!("/api/v1/invoices/{}/lines", invoice_id),
            tenant,
            json!({
                "kind": "product",
                "product_id": product,
                "description": "Amoxicillin 500mg",
                "quantity": 3,
                "unit_price": "100",
                "tax_amount": "54"
            }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(data(&body)["line_number"], 1);
    assert_eq!(dec_of(&data(&body)["net_amount"]), dec!(354));

    // Totals recomputed on the header
    let (_, body) = app
        .get(&format!("/api/v1/invoices/{}", invoice_id), tenant)
        .await;
    let header = &data(&body)["invoice"];
    assert_eq!(dec_of(&header["subtotal"]), dec!(300));
    assert_eq!(dec_of(&header["total_tax"]), dec!(54));
    assert_eq!(dec_of(&header["total"]), dec!(354));
    assert_eq!(dec_of(&header["outstanding"]), dec!(354));

    // Post: gets a number, becomes immutable
    let (status, body) = app
        .post_empty(&format!("/api/v1/invoices/{}/post", invoice_id), tenant)
        .await;
    assert_eq!(status, 200);
    let posted = data(&body);
    assert_eq!(posted["status"], "posted");
    assert_eq!(posted["invoice_number"], 1);
    assert_eq!(posted["invoice_number_display"], "INV-000001");

    // Line mutations now rejected
    let (status, body) = app
        .post(
            &format!("/api/v1/invoices/{}/lines", invoice_id),
            tenant,
            json!({
                "kind": "free_text",
                "description": "late fee",
                "quantity": 1,
                "unit_price": "5"
            }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(error_kind(&body), "immutable_invoice");

    // Pay in full
    let (status, body) = app
        .post(
            &format!("/api/v1/invoices/{}/payments", invoice_id),
            tenant,
            json!({ "amount": "354", "method": "cash" }),
        )
        .await;
    assert_eq!(status, 201);
    let payment = data(&body);
    assert_eq!(payment["invoice_status"], "paid");
    assert_eq!(dec_of(&payment["outstanding"]), dec!(0));

    // Void the paid invoice
    let (status, body) = app
        .post_empty(&format!("/api/v1/invoices/{}/void", invoice_id), tenant)
        .await;
    assert_eq!(status, 200);
    assert_eq!(data(&body)["status"], "void");

    // History captured every transition
    let (_, body) = app
        .get(&format!("/api/v1/invoices/{}/history", invoice_id), tenant)
        .await;
    let entries = data(&body).as_array().unwrap();
    let statuses: Vec<_> = entries
        .iter()
        .filter(|e| e["field"] == "status")
        .map(|e| e["new_value"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["posted", "paid", "void"]);
}

#[tokio::test]
async fn posting_empty_invoice_is_rejected() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;

    let (_, body) = app
        .post(
            "/api/v1/invoices",
            tenant,
            json!({ "patient_id": Uuid::new_v4(), "currency": "USD" }),
        )
        .await;
    let invoice_id = data(&body)["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post_empty(&format!("/api/v1/invoices/{}/post", invoice_id), tenant)
        .await;
    assert_eq!(status, 409);
    assert_eq!(error_kind(&body), "incomplete_invoice");
}

#[tokio::test]
async fn posting_twice_is_a_conflict() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;

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
            "description": "Consultation",
            "quantity": 1,
            "unit_price": "50"
        }),
    )
    .await;

    let (status, _) = app
        .post_empty(&format!("/api/v1/invoices/{}/post", invoice_id), tenant)
        .await;
    assert_eq!(status, 200);

    let (status, body) = app
        .post_empty(&format!("/api/v1/invoices/{}/post", invoice_id), tenant)
        .await;
    assert_eq!(status, 409);
    assert_eq!(error_kind(&body), "concurrency_conflict");
}

#[tokio::test]
async fn invoice_numbers_are_sequential_per_tenant() {
    let app = TestApp::new().await;
    let tenant_a = app.seed_tenant(false).await;
    let tenant_b = app.seed_tenant(false).await;

    let mut numbers = Vec::new();
    for tenant in [tenant_a, tenant_b, tenant_a] {
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
                "description": "Visit",
                "quantity": 1,
                "unit_price": "10"
            }),
        )
        .await;
        let (_, body) = app
            .post_empty(&format!("/api/v1/invoices/{}/post", invoice_id), tenant)
            .await;
        numbers.push(data(&body)["invoice_number"].as_i64().unwrap());
    }

    // Each tenant has its own gap-free sequence.
    assert_eq!(numbers, vec![1, 1, 2]);
}

#[tokio::test]
async fn draft_line_edits_keep_totals_consistent() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;

    let (_, body) = app
        .post(
            "/api/v1/invoices",
            tenant,
            json!({ "patient_id": Uuid::new_v4(), "currency": "USD" }),
        )
        .await;
    let invoice_id = data(&body)["id"].as_str().unwrap().to_string();

    let (_, body) = app
        .post(
            &format!("/api/v1/invoices/{}/lines", invoice_id),
            tenant,
            json!({
                "kind": "service",
                "description": "X-ray",
                "quantity": 2,
                "unit_price": "75",
                "discount_amount": "10"
            }),
        )
        .await;
    let line_id = data(&body)["id"].as_str().unwrap().to_string();
    assert_eq!(dec_of(&data(&body)["net_amount"]), dec!(140));

    // Bump the quantity
    let (status, body) = app
        .patch(
            &format!("/api/v1/invoices/{}/lines/{}", invoice_id, line_id),
            tenant,
            json!({ "quantity": 3 }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(dec_of(&data(&body)["net_amount"]), dec!(215));

    let (_, body) = app
        .get(&format!("/api/v1/invoices/{}", invoice_id), tenant)
        .await;
    assert_eq!(dec_of(&data(&body)["invoice"]["subtotal"]), dec!(225));
    assert_eq!(dec_of(&data(&body)["invoice"]["total"]), dec!(215));

    // Remove the line: totals go back to zero
    let (status, _) = app
        .delete(
            &format!("/api/v1/invoices/{}/lines/{}", invoice_id, line_id),
            tenant,
        )
        .await;
    assert_eq!(status, 200);

    let (_, body) = app
        .get(&format!("/api/v1/invoices/{}", invoice_id), tenant)
        .await;
    assert_eq!(dec_of(&data(&body)["invoice"]["total"]), dec!(0));
    assert!(data(&body)["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn line_numbers_survive_removal() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;

    let (_, body) = app
        .post(
            "/api/v1/invoices",
            tenant,
            json!({ "patient_id": Uuid::new_v4(), "currency": "USD" }),
        )
        .await;
    let invoice_id = data(&body)["id"].as_str().unwrap().to_string();

    let mut first_line_id = String::new();
    for (i, desc) in ["a", "b"].iter().enumerate() {
        let (_, body) = app
            .post(
                &format!("/api/v1/invoices/{}/lines", invoice_id),
                tenant,
                json!({
                    "kind": "free_text",
                    "description": desc,
                    "quantity": 1,
                    "unit_price": "1"
                }),
            )
            .await;
        if i == 0 {
            first_line_id = data(&body)["id"].as_str().unwrap().to_string();
        }
    }

    app.delete(
        &format!("/api/v1/invoices/{}/lines/{}", invoice_id, first_line_id),
        tenant,
    )
    .await;

    // New lines keep counting from the monotonic sequence.
    let (_, body) = app
        .post(
            &format!("/api/v1/invoices/{}/lines", invoice_id),
            tenant,
            json!({
                "kind": "free_text",
                "description": "c",
                "quantity": 1,
                "unit_price": "1"
            }),
        )
        .await;
    assert_eq!(data(&body)["line_number"], 3);
}

#[tokio::test]
async fn cancel_is_for_drafts_only() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant(false).await;

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
            "description": "Visit",
            "quantity": 1,
            "unit_price": "10"
        }),
    )
    .await;
    app.post_empty(&format!("/api/v1/invoices/{}/post", invoice_id), tenant)
        .await;

    let (status, body) = app
        .post_empty(&format!("/api/v1/invoices/{}/cancel", invoice_id), tenant)
        .await;
    assert_eq!(status, 409);
    assert_eq!(error_kind(&body), "invalid_state");
}

#[tokio::test]
async fn tenants_cannot_see_each_others_invoices() {
    let app = TestApp::new().await;
    let tenant_a = app.seed_tenant(false).await;
    let tenant_b = app.seed_tenant(false).await;

    let (_, body) = app
        .post(
            "/api/v1/invoices",
            tenant_a,
            json!({ "patient_id": Uuid::new_v4(), "currency": "USD" }),
        )
        .await;
    let invoice_id = data(&body)["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .get(&format!("/api/v1/invoices/{}", invoice_id), tenant_b)
        .await;
    assert_eq!(status, 404);
    assert_eq!(error_kind(&body), "not_found");
}

#[tokio::test]
async fn missing_tenant_header_is_rejected() {
    let app = TestApp::new().await;
    // A nil tenant id still satisfies the header; drop it entirely instead.
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    let router = clinibill_api::app(app.state.clone());
    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/invoices")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}
