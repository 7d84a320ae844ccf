use crate::grpc::{ProtoOpcode, ProtoPacket, ProtoResultCode};
use crate::rpc::RpcError;
use bytes::Bytes;
use std::convert::TryFrom;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    StreamRead,
    GetAllWatermarks,
    NotifyRepair,
    GetPartitionHosts,
    AdminTask,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    NotExist,
    DiskErr,
    ArgMismatch,
    TryOtherAddr,
    Err,
}

/// Packet is the application view of one node-to-node exchange. A request and its reply share
/// `req_id`, and a reply echoes the request's addressing fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub req_id: u64,
    pub opcode: Opcode,
    pub partition_id: u64,
    pub extent_id: u64,
    pub extent_offset: u64,
    pub size: u32,
    pub result_code: ResultCode,
    pub data: Bytes,
}

impl Packet {
    pub fn request(opcode: Opcode, partition_id: u64) -> Self {
        Packet {
            req_id: rand::random(),
            opcode,
            partition_id,
            extent_id: 0,
            extent_offset: 0,
            size: 0,
            result_code: ResultCode::Ok,
            data: Bytes::new(),
        }
    }

    pub fn with_extent(mut self, extent_id: u64, extent_offset: u64, size: u32) -> Self {
        self.extent_id = extent_id;
        self.extent_offset = extent_offset;
        self.size = size;
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn reply_ok(&self, data: impl Into<Bytes>) -> Packet {
        let data = data.into();
        Packet {
            result_code: ResultCode::Ok,
            size: data.len() as u32,
            data,
            ..self.clone()
        }
    }

    /// Error replies carry the message as UTF-8 in `data`.
    pub fn reply_err(&self, result_code: ResultCode, message: impl Into<String>) -> Packet {
        let data = Bytes::from(message.into());
        Packet {
            result_code,
            size: data.len() as u32,
            data,
            ..self.clone()
        }
    }

    /// Turns a non-OK reply into [`RpcError::Remote`].
    pub fn into_result(self) -> Result<Packet, RpcError> {
        match self.result_code {
            ResultCode::Ok => Ok(self),
            code => Err(RpcError::Remote {
                code,
                message: String::from_utf8_lossy(&self.data).into_owned(),
            }),
        }
    }
}

impl From<Opcode> for ProtoOpcode {
    fn from(opcode: Opcode) -> Self {
        match opcode {
            Opcode::StreamRead => ProtoOpcode::OpStreamRead,
            Opcode::GetAllWatermarks => ProtoOpcode::OpGetAllWatermarks,
            Opcode::NotifyRepair => ProtoOpcode::OpNotifyRepair,
            Opcode::GetPartitionHosts => ProtoOpcode::OpGetPartitionHosts,
            Opcode::AdminTask => ProtoOpcode::OpAdminTask,
        }
    }
}

impl From<ResultCode> for ProtoResultCode {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::Ok => ProtoResultCode::ResultOk,
            ResultCode::NotExist => ProtoResultCode::ResultNotExist,
            ResultCode::DiskErr => ProtoResultCode::ResultDiskErr,
            ResultCode::ArgMismatch => ProtoResultCode::ResultArgMismatch,
            ResultCode::TryOtherAddr => ProtoResultCode::ResultTryOtherAddr,
            ResultCode::Err => ProtoResultCode::ResultErr,
        }
    }
}

impl From<Packet> for ProtoPacket {
    fn from(packet: Packet) -> Self {
        ProtoPacket {
            req_id: packet.req_id,
            opcode: ProtoOpcode::from(packet.opcode) as i32,
            partition_id: packet.partition_id,
            extent_id: packet.extent_id,
            extent_offset: packet.extent_offset,
            size: packet.size,
            result_code: ProtoResultCode::from(packet.result_code) as i32,
            data: packet.data.to_vec(),
        }
    }
}

impl TryFrom<ProtoPacket> for Packet {
    type Error = RpcError;

    fn try_from(proto: ProtoPacket) -> Result<Self, Self::Error> {
        let opcode = match ProtoOpcode::from_i32(proto.opcode) {
            Some(ProtoOpcode::OpStreamRead) => Opcode::StreamRead,
            Some(ProtoOpcode::OpGetAllWatermarks) => Opcode::GetAllWatermarks,
            Some(ProtoOpcode::OpNotifyRepair) => Opcode::NotifyRepair,
            Some(ProtoOpcode::OpGetPartitionHosts) => Opcode::GetPartitionHosts,
            Some(ProtoOpcode::OpAdminTask) => Opcode::AdminTask,
            Some(ProtoOpcode::OpUnspecified) | None => {
                return Err(RpcError::Malformed(format!("unknown opcode {}", proto.opcode)));
            }
        };

        let result_code = match ProtoResultCode::from_i32(proto.result_code) {
            Some(ProtoResultCode::ResultOk) => ResultCode::Ok,
            Some(ProtoResultCode::ResultNotExist) => ResultCode::NotExist,
            Some(ProtoResultCode::ResultDiskErr) => ResultCode::DiskErr,
            Some(ProtoResultCode::ResultArgMismatch) => ResultCode::ArgMismatch,
            Some(ProtoResultCode::ResultTryOtherAddr) => ResultCode::TryOtherAddr,
            Some(ProtoResultCode::ResultErr) => ResultCode::Err,
            Some(ProtoResultCode::ResultUnspecified) | None => {
                return Err(RpcError::Malformed(format!("unknown result code {}", proto.result_code)));
            }
        };

        Ok(Packet {
            req_id: proto.req_id,
            opcode,
            partition_id: proto.partition_id,
            extent_id: proto.extent_id,
            extent_offset: proto.extent_offset,
            size: proto.size,
            result_code,
            data: Bytes::from(proto.data),
        })
    }
}
