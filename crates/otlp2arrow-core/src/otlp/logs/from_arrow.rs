// Columnar tables back to OTLP logs

use arrow::array::Array;
use arrow::datatypes::{Int32Type, TimestampNanosecondType};
use opentelemetry_proto::tonic::common::v1::AnyValue;
use opentelemetry_proto::tonic::logs::v1::{LogRecord, LogsData, ResourceLogs, ScopeLogs};

use crate::batch::EncodedBatch;
use crate::decode::{
    bytes_or_default, get, get_u32, nanos, string_or_default, AnyValueReader, AttributeIndex,
    EnvelopeReader, Table,
};
use crate::error::{Error, Result};
use crate::schema::{consts, PayloadType, SignalType};

/// Rebuilds `LogsData` from an encoded logs batch
#[derive(Debug, Default, Clone, Copy)]
pub struct LogsDecoder;

impl LogsDecoder {
    pub fn decode(batch: &EncodedBatch) -> Result<LogsData> {
        if batch.signal() != SignalType::Logs {
            return Err(Error::decode(
                PayloadType::Logs,
                format!("expected a logs batch, got {}", batch.signal()),
            ));
        }
        let primary = Table::from_batch(PayloadType::Logs, batch.primary());
        let ids = primary.u32s(consts::ID)?;
        let time = primary.primitive::<TimestampNanosecondType>(consts::TIME_UNIX_NANO)?;
        let observed =
            primary.primitive::<TimestampNanosecondType>(consts::OBSERVED_TIME_UNIX_NANO)?;
        let trace_ids = primary.binary(consts::TRACE_ID)?;
        let span_ids = primary.binary(consts::SPAN_ID)?;
        let severity = primary.primitive::<Int32Type>(consts::SEVERITY_NUMBER)?;
        let severity_text = primary.strings(consts::SEVERITY_TEXT)?;
        let body_valid = primary.structs(consts::BODY)?.nulls().cloned();
        let body = AnyValueReader::new(&primary.nested(consts::BODY)?)?;
        let dropped = primary.u32s(consts::DROPPED_ATTRIBUTES_COUNT)?;
        let flags = primary.u32s(consts::FLAGS)?;
        let mut attrs = AttributeIndex::load(batch, PayloadType::LogAttrs)?;

        let mut records = Vec::with_capacity(primary.len());
        for row in 0..primary.len() {
            let id = get_u32(&ids, row)
                .ok_or_else(|| primary.error(format!("null id at row {row}")))?;
            // A valid body with the empty type code is an AnyValue without a value
            let body = if body_valid.as_ref().map_or(true, |n| n.is_valid(row)) {
                Some(body.value(row)?.unwrap_or_else(AnyValue::default))
            } else {
                None
            };
            records.push(LogRecord {
                time_unix_nano: nanos(time, row),
                observed_time_unix_nano: nanos(observed, row),
                severity_number: get(severity, row).unwrap_or(0),
                severity_text: string_or_default(&severity_text, row),
                body,
                attributes: attrs.take(id),
                dropped_attributes_count: get_u32(&dropped, row).unwrap_or(0),
                flags: get_u32(&flags, row).unwrap_or(0),
                trace_id: bytes_or_default(trace_ids, row),
                span_id: bytes_or_default(span_ids, row),
                ..Default::default()
            });
        }

        let envelope = EnvelopeReader::new(batch, &primary)?;
        let resource_logs = envelope.assemble(
            records,
            |scope, schema_url, log_records| ScopeLogs {
                scope,
                log_records,
                schema_url,
            },
            |resource, schema_url, scope_logs| ResourceLogs {
                resource,
                scope_logs,
                schema_url,
            },
        );
        Ok(LogsData { resource_logs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SignalEncoder;
    use crate::config::LogsSort;
    use crate::otlp::logs::{optimize, LogsBuilder};
    use opentelemetry_proto::tonic::common::v1::{
        any_value, ArrayValue, InstrumentationScope, KeyValue, KeyValueList,
    };
    use opentelemetry_proto::tonic::resource::v1::Resource;

    fn string(value: &str) -> AnyValue {
        AnyValue {
            value: Some(any_value::Value::StringValue(value.into())),
        }
    }

    #[test]
    fn bodies_and_envelopes_survive() {
        let kvlist = AnyValue {
            value: Some(any_value::Value::KvlistValue(KeyValueList {
                values: vec![KeyValue {
                    key: "nested".into(),
                    value: Some(AnyValue {
                        value: Some(any_value::Value::ArrayValue(ArrayValue {
                            values: vec![string("a"), string("b")],
                        })),
                    }),
                }],
            })),
        };
        let records = vec![
            LogRecord {
                time_unix_nano: u64::MAX,
                observed_time_unix_nano: 5,
                severity_number: 17,
                severity_text: "ERROR".into(),
                body: Some(kvlist),
                attributes: vec![KeyValue {
                    key: "http.status".into(),
                    value: Some(AnyValue {
                        value: Some(any_value::Value::IntValue(500)),
                    }),
                }],
                trace_id: vec![7; 16],
                span_id: vec![8; 8],
                flags: 1,
                ..Default::default()
            },
            LogRecord {
                body: Some(AnyValue::default()),
                dropped_attributes_count: 2,
                ..Default::default()
            },
            LogRecord {
                body: Some(AnyValue {
                    value: Some(any_value::Value::BytesValue(vec![0, 1, 2])),
                }),
                ..Default::default()
            },
        ];
        let data = LogsData {
            resource_logs: vec![
                ResourceLogs {
                    resource: Some(Resource {
                        attributes: vec![KeyValue {
                            key: "service.name".into(),
                            value: Some(string("api")),
                        }],
                        dropped_attributes_count: 1,
                        ..Default::default()
                    }),
                    scope_logs: vec![ScopeLogs {
                        scope: Some(InstrumentationScope {
                            name: "logger".into(),
                            version: "1.0".into(),
                            ..Default::default()
                        }),
                        log_records: records.clone(),
                        schema_url: "https://example.com/scope".into(),
                    }],
                    schema_url: "https://example.com/resource".into(),
                },
                ResourceLogs {
                    scope_logs: vec![ScopeLogs {
                        log_records: records,
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
        };

        let mut builder = LogsBuilder::new().unwrap();
        builder.append(&data).unwrap();
        let batch = builder.build().unwrap();
        let decoded = LogsDecoder::decode(&batch).unwrap();
        assert_eq!(decoded, optimize(&data, LogsSort::None).to_logs_data());
    }

    #[test]
    fn wrong_signal_is_rejected() {
        let batch = EncodedBatch::new(
            SignalType::Logs,
            vec![(
                PayloadType::Logs,
                arrow::array::RecordBatch::new_empty(crate::schema::schema_for(PayloadType::Logs)),
            )],
        )
        .unwrap();
        assert!(LogsDecoder::decode(&batch).unwrap().resource_logs.is_empty());
        assert!(crate::otlp::metrics::MetricsDecoder::decode(&batch).is_err());
    }
}
