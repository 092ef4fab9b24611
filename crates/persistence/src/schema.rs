//! ScyllaDB schema creation for the projection-store table layout.

use crate::error::PersistenceError;
use scylla::Session;

pub async fn create_keyspace(session: &Session, keyspace: &str, replication_factor: u8) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );
    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create keyspace: {}", e)))?;
    Ok(())
}

pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    let statements = [
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.transcriptions (
                call_id TEXT PRIMARY KEY,
                full_text TEXT,
                language TEXT,
                confidence DOUBLE,
                word_count INT,
                segments_json TEXT,
                created_at TIMESTAMP
            )"#,
            ks = keyspace
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.sentiments (
                call_id TEXT PRIMARY KEY,
                overall_sentiment TEXT,
                sentiment_score DOUBLE,
                escalation_detected BOOLEAN,
                segment_sentiments_json TEXT,
                created_at TIMESTAMP
            )"#,
            ks = keyspace
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.voc_insights (
                call_id TEXT PRIMARY KEY,
                primary_intent TEXT,
                topics LIST<TEXT>,
                keywords LIST<TEXT>,
                customer_satisfaction TEXT,
                predicted_churn_risk DOUBLE,
                actionable_items LIST<TEXT>,
                summary TEXT,
                created_at TIMESTAMP
            )"#,
            ks = keyspace
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.audit_results (
                call_id TEXT PRIMARY KEY,
                audit_result_id UUID,
                overall_score TINYINT,
                compliance_status TEXT,
                script_adherence TINYINT,
                customer_service TINYINT,
                resolution_effectiveness TINYINT,
                flags_for_review BOOLEAN,
                review_reason TEXT,
                created_at TIMESTAMP
            )"#,
            ks = keyspace
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.compliance_violations (
                audit_result_id UUID,
                violation_id UUID,
                rule_id TEXT,
                rule_name TEXT,
                severity TEXT,
                description TEXT,
                timestamp_in_call DOUBLE,
                evidence TEXT,
                PRIMARY KEY ((audit_result_id), violation_id)
            )"#,
            ks = keyspace
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.agent_performance (
                agent_id TEXT,
                hour_slot TIMESTAMP,
                count BIGINT,
                avg_quality DOUBLE,
                quality_count BIGINT,
                avg_sentiment DOUBLE,
                sentiment_count BIGINT,
                avg_satisfaction DOUBLE,
                satisfaction_count BIGINT,
                avg_compliance_pass_rate DOUBLE,
                compliance_pass_count BIGINT,
                avg_churn_risk DOUBLE,
                churn_risk_count BIGINT,
                PRIMARY KEY ((agent_id), hour_slot)
            ) WITH CLUSTERING ORDER BY (hour_slot DESC)"#,
            ks = keyspace
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.notifications (
                call_id TEXT,
                notification_id UUID,
                notification_type TEXT,
                recipient TEXT,
                channel TEXT,
                subject TEXT,
                body TEXT,
                priority TEXT,
                status TEXT,
                sent_at TIMESTAMP,
                error_message TEXT,
                created_at TIMESTAMP,
                PRIMARY KEY ((call_id), notification_id)
            )"#,
            ks = keyspace
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.compliance_rules (
                rule_id TEXT PRIMARY KEY,
                name TEXT,
                category TEXT,
                severity TEXT,
                is_active BOOLEAN,
                definition_json TEXT
            )"#,
            ks = keyspace
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {ks}.events (
                aggregate_id TEXT,
                timestamp TIMESTAMP,
                event_id UUID,
                event_type TEXT,
                correlation_id UUID,
                causation_id UUID,
                payload_json TEXT,
                PRIMARY KEY ((aggregate_id), timestamp, event_id)
            ) WITH CLUSTERING ORDER BY (timestamp ASC)"#,
            ks = keyspace
        ),
    ];

    for statement in statements {
        session
            .query_unpaged(statement, &[])
            .await
            .map_err(|e| PersistenceError::Schema(format!("failed to create table: {}", e)))?;
    }
    Ok(())
}
