//! Engine status codes.
//!
//! Engines report the outcome of `submit` with the same integer codes the
//! PostgreSQL server programming interface uses: positive values name the kind
//! of statement that ran, negative values are failures.

pub const SPI_ERROR_CONNECT: i32 = -1;
pub const SPI_ERROR_COPY: i32 = -2;
pub const SPI_ERROR_OPUNKNOWN: i32 = -3;
pub const SPI_ERROR_UNCONNECTED: i32 = -4;
pub const SPI_ERROR_CURSOR: i32 = -5;
pub const SPI_ERROR_ARGUMENT: i32 = -6;
pub const SPI_ERROR_PARAM: i32 = -7;
pub const SPI_ERROR_TRANSACTION: i32 = -8;
pub const SPI_ERROR_NOATTRIBUTE: i32 = -9;
pub const SPI_ERROR_NOOUTFUNC: i32 = -10;
pub const SPI_ERROR_TYPUNKNOWN: i32 = -11;
pub const SPI_ERROR_REL_DUPLICATE: i32 = -12;
pub const SPI_ERROR_REL_NOT_FOUND: i32 = -13;

pub const SPI_OK_CONNECT: i32 = 1;
pub const SPI_OK_FINISH: i32 = 2;
pub const SPI_OK_FETCH: i32 = 3;
pub const SPI_OK_UTILITY: i32 = 4;
pub const SPI_OK_SELECT: i32 = 5;
pub const SPI_OK_SELINTO: i32 = 6;
pub const SPI_OK_INSERT: i32 = 7;
pub const SPI_OK_DELETE: i32 = 8;
pub const SPI_OK_UPDATE: i32 = 9;
pub const SPI_OK_CURSOR: i32 = 10;
pub const SPI_OK_INSERT_RETURNING: i32 = 11;
pub const SPI_OK_DELETE_RETURNING: i32 = 12;
pub const SPI_OK_UPDATE_RETURNING: i32 = 13;
pub const SPI_OK_REWRITTEN: i32 = 14;
pub const SPI_OK_REL_REGISTER: i32 = 15;
pub const SPI_OK_REL_UNREGISTER: i32 = 16;
pub const SPI_OK_TD_REGISTER: i32 = 17;
pub const SPI_OK_MERGE: i32 = 18;
pub const SPI_OK_MERGE_RETURNING: i32 = 19;

/// Returns the symbolic name of a status code.
pub fn result_code_to_string(code: i32) -> String {
    let name = match code {
        SPI_ERROR_CONNECT => "SPI_ERROR_CONNECT",
        SPI_ERROR_COPY => "SPI_ERROR_COPY",
        SPI_ERROR_OPUNKNOWN => "SPI_ERROR_OPUNKNOWN",
        SPI_ERROR_UNCONNECTED => "SPI_ERROR_UNCONNECTED",
        SPI_ERROR_CURSOR => "SPI_ERROR_CURSOR",
        SPI_ERROR_ARGUMENT => "SPI_ERROR_ARGUMENT",
        SPI_ERROR_PARAM => "SPI_ERROR_PARAM",
        SPI_ERROR_TRANSACTION => "SPI_ERROR_TRANSACTION",
        SPI_ERROR_NOATTRIBUTE => "SPI_ERROR_NOATTRIBUTE",
        SPI_ERROR_NOOUTFUNC => "SPI_ERROR_NOOUTFUNC",
        SPI_ERROR_TYPUNKNOWN => "SPI_ERROR_TYPUNKNOWN",
        SPI_ERROR_REL_DUPLICATE => "SPI_ERROR_REL_DUPLICATE",
        SPI_ERROR_REL_NOT_FOUND => "SPI_ERROR_REL_NOT_FOUND",
        SPI_OK_CONNECT => "SPI_OK_CONNECT",
        SPI_OK_FINISH => "SPI_OK_FINISH",
        SPI_OK_FETCH => "SPI_OK_FETCH",
        SPI_OK_UTILITY => "SPI_OK_UTILITY",
        SPI_OK_SELECT => "SPI_OK_SELECT",
        SPI_OK_SELINTO => "SPI_OK_SELINTO",
        SPI_OK_INSERT => "SPI_OK_INSERT",
        SPI_OK_DELETE => "SPI_OK_DELETE",
        SPI_OK_UPDATE => "SPI_OK_UPDATE",
        SPI_OK_CURSOR => "SPI_OK_CURSOR",
        SPI_OK_INSERT_RETURNING => "SPI_OK_INSERT_RETURNING",
        SPI_OK_DELETE_RETURNING => "SPI_OK_DELETE_RETURNING",
        SPI_OK_UPDATE_RETURNING => "SPI_OK_UPDATE_RETURNING",
        SPI_OK_REWRITTEN => "SPI_OK_REWRITTEN",
        SPI_OK_REL_REGISTER => "SPI_OK_REL_REGISTER",
        SPI_OK_REL_UNREGISTER => "SPI_OK_REL_UNREGISTER",
        SPI_OK_TD_REGISTER => "SPI_OK_TD_REGISTER",
        SPI_OK_MERGE => "SPI_OK_MERGE",
        SPI_OK_MERGE_RETURNING => "SPI_OK_MERGE_RETURNING",
        _ => return format!("Unrecognized SPI code {code}"),
    };
    name.to_string()
}
