//! Generic packet-based transfer transport, shared by the sample dump
//! and firmware dump payload kinds. The transport owns session
//! bookkeeping (state, expected packet number, ACK/NAK framing); a
//! [`PayloadHandler`] owns what the bytes actually mean.

use crate::config::SDS_PACKET_DATA_LEN;

/// A single response the transport wants sent back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferResponse {
    Ack(u8),
    Nak(u8),
    /// Cancel messages get no reply, per the SDS standard.
    NoReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    ReceivingData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferResult {
    Ok,
    TransferComplete,
    Cancelled,
    InvalidMessage,
    ChecksumError,
    StateError,
    PayloadError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadProcessResult {
    Ok,
    TransferComplete,
    Error,
}

/// Implemented by each concrete payload kind (sample PCM data,
/// firmware image data). The transport never interprets packet bytes
/// itself; it only frames and sequences them.
pub trait PayloadHandler {
    fn begin_transfer(&mut self, header_data: &[u8]) -> bool;
    fn process_packet(&mut self, packet_data: &[u8], packet_num: u8) -> PayloadProcessResult;
    fn finalize_transfer(&mut self) -> bool;
    fn cancel_transfer(&mut self);
    fn calculate_checksum(&self, packet_num: u8, data: &[u8]) -> u8;
}

/// Generic packet transport parameterized over a [`PayloadHandler`].
pub struct DataTransferProtocol<H: PayloadHandler> {
    payload_handler: H,
    state: TransferState,
    expected_packet_num: u8,
}

pub(crate) const DUMP_HEADER: u8 = 0x01;
pub(crate) const DATA_PACKET: u8 = 0x02;
pub(crate) const CANCEL: u8 = 0x7D;
const DATA_PACKET_MESSAGE_LEN: usize = SDS_PACKET_DATA_LEN + 2;
const DUMP_HEADER_MIN_LEN: usize = 17;

impl<H: PayloadHandler> DataTransferProtocol<H> {
    pub fn new(payload_handler: H) -> Self {
        DataTransferProtocol {
            payload_handler,
            state: TransferState::Idle,
            expected_packet_num: 0,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state != TransferState::Idle
    }

    pub fn payload_handler(&self) -> &H {
        &self.payload_handler
    }

    pub fn process_message(
        &mut self,
        message_type: u8,
        message_data: &[u8],
    ) -> (TransferResult, TransferResponse) {
        match message_type {
            DUMP_HEADER => self.handle_dump_header(message_data),
            DATA_PACKET => self.handle_data_packet(message_data),
            CANCEL => (TransferResult::Cancelled, self.handle_cancel()),
            _ => (TransferResult::InvalidMessage, TransferResponse::Nak(0)),
        }
    }

    fn handle_dump_header(&mut self, message: &[u8]) -> (TransferResult, TransferResponse) {
        if message.len() < DUMP_HEADER_MIN_LEN {
            return (TransferResult::InvalidMessage, TransferResponse::Nak(0));
        }

        if self.state != TransferState::Idle {
            self.payload_handler.cancel_transfer();
        }

        if !self.payload_handler.begin_transfer(message) {
            self.state = TransferState::Idle;
            return (TransferResult::PayloadError, TransferResponse::Nak(0));
        }

        self.state = TransferState::ReceivingData;
        self.expected_packet_num = 0;
        (TransferResult::Ok, TransferResponse::Ack(0))
    }

    fn handle_data_packet(&mut self, message: &[u8]) -> (TransferResult, TransferResponse) {
        if self.state != TransferState::ReceivingData {
            return (TransferResult::StateError, TransferResponse::Nak(0));
        }

        if message.len() != DATA_PACKET_MESSAGE_LEN {
            return (
                TransferResult::InvalidMessage,
                TransferResponse::Nak(self.expected_packet_num),
            );
        }

        let packet_num = message[0];
        let data = &message[1..1 + SDS_PACKET_DATA_LEN];
        let received_checksum = message[1 + SDS_PACKET_DATA_LEN];

        let calculated = self.payload_handler.calculate_checksum(packet_num, data);
        if received_checksum != calculated {
            return (
                TransferResult::ChecksumError,
                TransferResponse::Nak(packet_num),
            );
        }

        // Out-of-order packets are accepted (and logged by the caller);
        // the SDS standard does not require strict rejection here.
        let process_result = self.payload_handler.process_packet(data, packet_num);
        if process_result == PayloadProcessResult::Error {
            self.payload_handler.cancel_transfer();
            self.state = TransferState::Idle;
            return (TransferResult::PayloadError, TransferResponse::Nak(packet_num));
        }

        self.expected_packet_num = packet_num.wrapping_add(1) & 0x7F;

        if process_result == PayloadProcessResult::TransferComplete {
            if !self.payload_handler.finalize_transfer() {
                self.payload_handler.cancel_transfer();
                self.state = TransferState::Idle;
                return (TransferResult::PayloadError, TransferResponse::Nak(packet_num));
            }
            self.state = TransferState::Idle;
            return (TransferResult::TransferComplete, TransferResponse::Ack(packet_num));
        }

        (TransferResult::Ok, TransferResponse::Ack(packet_num))
    }

    fn handle_cancel(&mut self) -> TransferResponse {
        if self.state != TransferState::Idle {
            self.payload_handler.cancel_transfer();
            self.state = TransferState::Idle;
        }
        TransferResponse::NoReply
    }
}
