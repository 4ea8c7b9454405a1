use proto::{AgentResponse, ChannelEvent, ChannelId, Message, Role, SessionId, ToolRequest};

#[test]
fn serialized_session_history_keeps_tool_links() {
    let request = ToolRequest::new(
        "check_asv",
        r#"{"bank_name":"Сбер","amount":2500000}"#,
        "call-7",
    );
    let history = vec![
        Message::system("prompt"),
        Message::user("У меня в Сбере 2.5 млн"),
        Message::assistant_tool_request("", request.clone()),
        Message::tool_result("call-7", "Превышен лимит АСВ!"),
        Message::assistant("Лимит превышен на 1 100 000 рублей."),
    ];

    let json = serde_json::to_string(&history).expect("serialize history");
    let restored: Vec<Message> = serde_json::from_str(&json).expect("deserialize history");

    assert_eq!(restored, history);
    assert_eq!(restored[2].role, Role::Assistant);
    assert_eq!(restored[2].tool_request.as_ref(), Some(&request));
    assert_eq!(restored[3].tool_result_of.as_deref(), Some("call-7"));
}

#[test]
fn event_and_response_carry_the_same_session() {
    let event = ChannelEvent::new(
        ChannelId::new("web", "req-1"),
        SessionId::from("web-7f3a"),
        "привет",
    );
    let wire = serde_json::to_string(&event).expect("serialize event");
    let parsed: ChannelEvent = serde_json::from_str(&wire).expect("deserialize event");

    let response = AgentResponse::error(
        parsed.channel_id.clone(),
        parsed.session_id.clone(),
        "sorry",
    );
    assert!(response.is_error);
    assert_eq!(response.channel_id, ChannelId::new("web", "req-1"));
    assert_eq!(response.session_id, SessionId::from("web-7f3a"));
}
