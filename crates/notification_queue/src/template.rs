use crate::delivery::MessageEnvelope;
use crate::job::{Language, NotificationJob, TemplateStatus};

/// Typed parameters handed to the message templates; built from a job's
/// payload so a template can never reference a missing placeholder
#[derive(Debug, Clone)]
pub struct TemplateParams<'a> {
    /// Customer display name
    pub customer_name: &'a str,
    /// Human-readable order number
    pub order_number: &'a str,
    /// Rental period, already formatted for display
    pub period: String,
    /// Number of billable days
    pub total_days: i64,
    /// Grand total charged for the order
    pub total_amount: f64,
}

impl<'a> TemplateParams<'a> {
    /// Extracts the template parameters from a job's payload
    pub fn from_job(job: &'a NotificationJob) -> TemplateParams<'a> {
        TemplateParams {
            customer_name: &job.payload.customer_name,
            order_number: &job.payload.order_number,
            period: format!(
                "{} to {}",
                job.payload.start_date.format("%B %d, %Y"),
                job.payload.end_date.format("%B %d, %Y")
            ),
            total_days: job.payload.total_days,
            total_amount: job.payload.total_amount,
        }
    }
}

/// Renders the envelope for a job: subject and body for its template and
/// language, addressed to the job's recipient
pub fn render(job: &NotificationJob) -> MessageEnvelope {
    let params = TemplateParams::from_job(job);
    let (subject, body) = match job.language {
        Language::En => render_en(job.template_status, &params),
        Language::Es => render_es(job.template_status, &params),
        Language::Pt => render_pt(job.template_status, &params),
    };

    MessageEnvelope {
        to: job.recipient.clone(),
        subject,
        body,
    }
}

fn render_en(template: TemplateStatus, p: &TemplateParams<'_>) -> (String, String) {
    match template {
        TemplateStatus::Confirmed => (
            format!("Booking confirmed: {}", p.order_number),
            format!(
                "Hi {},\n\nYour booking {} is confirmed for {} ({} days).\nTotal charged: ${:.2}.\n\nEnjoy your rental!",
                p.customer_name, p.order_number, p.period, p.total_days, p.total_amount
            ),
        ),
        TemplateStatus::Ongoing => (
            format!("Rental started: {}", p.order_number),
            format!(
                "Hi {},\n\nYour rental {} has started. It runs {}.\n\nSafe travels!",
                p.customer_name, p.order_number, p.period
            ),
        ),
        TemplateStatus::Completed => (
            format!("Rental completed: {}", p.order_number),
            format!(
                "Hi {},\n\nYour rental {} is complete. Thanks for riding with us!",
                p.customer_name, p.order_number
            ),
        ),
        TemplateStatus::Cancelled => (
            format!("Booking cancelled: {}", p.order_number),
            format!(
                "Hi {},\n\nYour booking {} for {} has been cancelled.",
                p.customer_name, p.order_number, p.period
            ),
        ),
        TemplateStatus::Refunded => (
            format!("Refund issued: {}", p.order_number),
            format!(
                "Hi {},\n\nWe have issued a refund of ${:.2} for order {}.",
                p.customer_name, p.total_amount, p.order_number
            ),
        ),
        TemplateStatus::PaymentReminder => (
            format!("Payment reminder: {}", p.order_number),
            format!(
                "Hi {},\n\nYour booking {} for {} is still awaiting payment of ${:.2}. It will be cancelled if payment is not completed.",
                p.customer_name, p.order_number, p.period, p.total_amount
            ),
        ),
    }
}

fn render_es(template: TemplateStatus, p: &TemplateParams<'_>) -> (String, String) {
    match template {
        TemplateStatus::Confirmed => (
            format!("Reserva confirmada: {}", p.order_number),
            format!(
                "Hola {},\n\nTu reserva {} está confirmada para {} ({} días).\nTotal cobrado: ${:.2}.",
                p.customer_name, p.order_number, p.period, p.total_days, p.total_amount
            ),
        ),
        TemplateStatus::Ongoing => (
            format!("Alquiler iniciado: {}", p.order_number),
            format!(
                "Hola {},\n\nTu alquiler {} ha comenzado. Periodo: {}.",
                p.customer_name, p.order_number, p.period
            ),
        ),
        TemplateStatus::Completed => (
            format!("Alquiler finalizado: {}", p.order_number),
            format!(
                "Hola {},\n\nTu alquiler {} ha finalizado. ¡Gracias!",
                p.customer_name, p.order_number
            ),
        ),
        TemplateStatus::Cancelled => (
            format!("Reserva cancelada: {}", p.order_number),
            format!(
                "Hola {},\n\nTu reserva {} para {} ha sido cancelada.",
                p.customer_name, p.order_number, p.period
            ),
        ),
        TemplateStatus::Refunded => (
            format!("Reembolso emitido: {}", p.order_number),
            format!(
                "Hola {},\n\nHemos emitido un reembolso de ${:.2} por el pedido {}.",
                p.customer_name, p.total_amount, p.order_number
            ),
        ),
        TemplateStatus::PaymentReminder => (
            format!("Recordatorio de pago: {}", p.order_number),
            format!(
                "Hola {},\n\nTu reserva {} para {} sigue pendiente de pago (${:.2}).",
                p.customer_name, p.order_number, p.period, p.total_amount
            ),
        ),
    }
}

fn render_pt(template: TemplateStatus, p: &TemplateParams<'_>) -> (String, String) {
    match template {
        TemplateStatus::Confirmed => (
            format!("Reserva confirmada: {}", p.order_number),
            format!(
                "Olá {},\n\nSua reserva {} está confirmada para {} ({} dias).\nTotal cobrado: ${:.2}.",
                p.customer_name, p.order_number, p.period, p.total_days, p.total_amount
            ),
        ),
        TemplateStatus::Ongoing => (
            format!("Aluguel iniciado: {}", p.order_number),
            format!(
                "Olá {},\n\nSeu aluguel {} começou. Período: {}.",
                p.customer_name, p.order_number, p.period
            ),
        ),
        TemplateStatus::Completed => (
            format!("Aluguel finalizado: {}", p.order_number),
            format!(
                "Olá {},\n\nSeu aluguel {} foi concluído. Obrigado!",
                p.customer_name, p.order_number
            ),
        ),
        TemplateStatus::Cancelled => (
            format!("Reserva cancelada: {}", p.order_number),
            format!(
                "Olá {},\n\nSua reserva {} para {} foi cancelada.",
                p.customer_name, p.order_number, p.period
            ),
        ),
        TemplateStatus::Refunded => (
            format!("Reembolso emitido: {}", p.order_number),
            format!(
                "Olá {},\n\nEmitimos um reembolso de ${:.2} para o pedido {}.",
                p.customer_name, p.total_amount, p.order_number
            ),
        ),
        TemplateStatus::PaymentReminder => (
            format!("Lembrete de pagamento: {}", p.order_number),
            format!(
                "Olá {},\n\nSua reserva {} para {} ainda aguarda pagamento (${:.2}).",
                p.customer_name, p.order_number, p.period, p.total_amount
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::OrderContext;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn job(template: TemplateStatus, language: Language) -> NotificationJob {
        NotificationJob::new(
            "ana@example.com".to_string(),
            template,
            language,
            OrderContext {
                order_id: Uuid::new_v4(),
                order_number: "RNT-20240601-0001".to_string(),
                customer_name: "Ana Souza".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
                total_days: 4,
                total_amount: 263.56,
            },
        )
    }

    #[test]
    fn renders_confirmed_envelope_with_order_details() {
        let envelope = render(&job(TemplateStatus::Confirmed, Language::En));

        assert_eq!(envelope.to, "ana@example.com");
        assert!(envelope.subject.contains("RNT-20240601-0001"));
        assert!(envelope.body.contains("Ana Souza"));
        assert!(envelope.body.contains("$263.56"));
        assert!(envelope.body.contains("June 01, 2024"));
    }

    #[test]
    fn renders_every_template_in_every_language() {
        for template in [
            TemplateStatus::Confirmed,
            TemplateStatus::Ongoing,
            TemplateStatus::Completed,
            TemplateStatus::Cancelled,
            TemplateStatus::Refunded,
            TemplateStatus::PaymentReminder,
        ] {
            for language in [Language::En, Language::Es, Language::Pt] {
                let envelope = render(&job(template, language));
                assert!(envelope.subject.contains("RNT-20240601-0001"));
                assert!(envelope.body.contains("Ana Souza"));
            }
        }
    }
}
