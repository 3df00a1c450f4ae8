//! Reply synthesis for blocked, empty, and failure responses.
//!
//! Forwarded traffic never passes through here; upstream bytes are relayed
//! verbatim. These builders cover every reply the resolver originates
//! itself: the question section is echoed and the transaction ID copied
//! from the query.

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record, RecordType};
use std::net::Ipv4Addr;

use crate::config::BlockAction;

/// Base response: ID, opcode, and RD copied from the query, question
/// echoed, no answers.
fn response_from(query: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired());
    response.add_queries(query.queries().to_vec());
    response
}

/// Empty NOERROR reply for zero-question messages.
pub fn empty_reply(query: &Message) -> Message {
    let mut response = response_from(query);
    response.set_authoritative(true);
    response
}

/// Header-only reply for datagrams that carried a readable ID but no
/// decodable message.
pub fn header_only_reply(id: u16) -> Message {
    let mut response = Message::new();
    response
        .set_id(id)
        .set_message_type(MessageType::Response);
    response
}

pub fn servfail(query: &Message) -> Message {
    let mut response = response_from(query);
    response.set_response_code(ResponseCode::ServFail);
    response
}

/// Builds the deny reply for a blocked name.
///
/// `nxdomain` answers NameError with no records. `redirect` and
/// `block_page` answer A queries with a single A record (TTL 300) at the
/// redirect target or 127.0.0.1; every other query type gets an empty
/// NOERROR answer.
pub fn blocked_answer(query: &Message, action: BlockAction, redirect_ip: &str) -> Message {
    let mut response = response_from(query);
    response.set_authoritative(true);

    match action {
        BlockAction::Nxdomain => {
            response.set_response_code(ResponseCode::NXDomain);
        }
        BlockAction::Redirect => {
            add_redirect_answer(&mut response, query, redirect_ip.parse().ok());
        }
        BlockAction::BlockPage => {
            add_redirect_answer(&mut response, query, Some(Ipv4Addr::LOCALHOST));
        }
    }

    response
}

fn add_redirect_answer(response: &mut Message, query: &Message, target: Option<Ipv4Addr>) {
    let Some(target) = target else {
        return;
    };
    let Some(question) = query.queries().first() else {
        return;
    };
    if question.query_type() == RecordType::A {
        response.add_answer(Record::from_rdata(
            question.name().clone(),
            300,
            RData::A(A(target)),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::Query;
    use hickory_proto::rr::Name;

    fn make_query(name: &str, qtype: RecordType, id: u16) -> Message {
        let mut message = Message::new();
        message
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_recursion_desired(true);
        message.add_query(Query::query(Name::from_ascii(name).unwrap(), qtype));
        message
    }

    #[test]
    fn test_nxdomain_shape() {
        let query = make_query("ads.example.", RecordType::A, 0xbeef);
        let response = blocked_answer(&query, BlockAction::Nxdomain, "0.0.0.0");

        assert_eq!(response.id(), 0xbeef);
        assert_eq!(response.response_code(), ResponseCode::NXDomain);
        assert!(response.answers().is_empty());
        assert!(response.authoritative());
        assert_eq!(response.queries(), query.queries());
    }

    #[test]
    fn test_redirect_answers_a_queries() {
        let query = make_query("ads.example.", RecordType::A, 7);
        let response = blocked_answer(&query, BlockAction::Redirect, "10.0.0.1");

        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 1);
        let record = &response.answers()[0];
        assert_eq!(record.ttl(), 300);
        assert_eq!(
            record.data(),
            Some(&RData::A(A("10.0.0.1".parse().unwrap())))
        );
    }

    #[test]
    fn test_redirect_empty_for_other_types() {
        for qtype in [RecordType::AAAA, RecordType::MX, RecordType::TXT] {
            let query = make_query("ads.example.", qtype, 7);
            let response = blocked_answer(&query, BlockAction::Redirect, "10.0.0.1");
            assert_eq!(response.response_code(), ResponseCode::NoError);
            assert!(response.answers().is_empty(), "unexpected answer for {qtype}");
        }
    }

    #[test]
    fn test_block_page_uses_loopback() {
        let query = make_query("ads.example.", RecordType::A, 7);
        let response = blocked_answer(&query, BlockAction::BlockPage, "ignored");
        assert_eq!(
            response.answers()[0].data(),
            Some(&RData::A(A(Ipv4Addr::LOCALHOST)))
        );
    }

    #[test]
    fn test_invalid_redirect_ip_yields_empty_answer() {
        let query = make_query("ads.example.", RecordType::A, 7);
        let response = blocked_answer(&query, BlockAction::Redirect, "not-an-ip");
        assert!(response.answers().is_empty());
        assert_eq!(response.response_code(), ResponseCode::NoError);
    }

    #[test]
    fn test_servfail_echoes_question() {
        let query = make_query("example.com.", RecordType::AAAA, 42);
        let response = servfail(&query);
        assert_eq!(response.id(), 42);
        assert_eq!(response.response_code(), ResponseCode::ServFail);
        assert_eq!(response.queries(), query.queries());
    }
}
