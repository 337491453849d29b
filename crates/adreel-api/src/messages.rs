//! User-facing messages in English and Japanese.
//!
//! The request locale is carried in a task-local set by the locale
//! middleware, so error rendering does not need the request.

use adreel_models::{JobStatus, Locale};

use crate::error::ErrorCode;

tokio::task_local! {
    pub static LOCALE: Locale;
}

/// Locale of the request being served, English outside a request scope.
pub fn current_locale() -> Locale {
    LOCALE.try_with(|l| *l).unwrap_or_default()
}

pub fn user_message(code: ErrorCode, locale: Locale) -> &'static str {
    match locale {
        Locale::En => match code {
            ErrorCode::ValidationError => "Some of the information provided is invalid. Please check and try again.",
            ErrorCode::InvalidJobId => "That video ID is not valid.",
            ErrorCode::JobNotFound => "We couldn't find that video.",
            ErrorCode::JobExpired => "This video has expired. Please generate a new one.",
            ErrorCode::CannotCancel => "This video has already finished and can't be cancelled.",
            ErrorCode::CancellationFailed => "We couldn't cancel the video. Please try again.",
            ErrorCode::BudgetExceeded => "The service has reached its spending limit. Please try again later.",
            ErrorCode::RateLimitExceeded => "Too many requests. Please wait a moment and try again.",
            ErrorCode::VeoApiError => "Video generation is unavailable right now. Please try again later.",
            ErrorCode::AiApiError => "The AI assistant is unavailable right now. Please try again later.",
            ErrorCode::SessionNotFound => "We couldn't find your session. Please start over.",
            ErrorCode::SessionExpired => "Your session has expired. Please start over.",
            ErrorCode::SessionError => "Your session was updated elsewhere. Please try again.",
            ErrorCode::FileTooLarge => "The image is too large. Please upload a smaller file.",
            ErrorCode::UnsupportedFormat => "Please upload a JPEG, PNG or WebP image.",
            ErrorCode::HandoffIncomplete => "The previous step is not complete yet.",
            ErrorCode::HandoffOutOfOrder => "This step has already been completed.",
            ErrorCode::Unauthorized => "You are not authorized to perform this action.",
            ErrorCode::NotFound => "The requested resource was not found.",
            ErrorCode::InternalServerError => "Something went wrong. Please try again later.",
        },
        Locale::Ja => match code {
            ErrorCode::ValidationError => "入力内容に誤りがあります。確認してもう一度お試しください。",
            ErrorCode::InvalidJobId => "動画IDが正しくありません。",
            ErrorCode::JobNotFound => "動画が見つかりませんでした。",
            ErrorCode::JobExpired => "この動画は有効期限が切れています。新しく生成してください。",
            ErrorCode::CannotCancel => "この動画はすでに完了しているためキャンセルできません。",
            ErrorCode::CancellationFailed => "キャンセルできませんでした。もう一度お試しください。",
            ErrorCode::BudgetExceeded => "利用上限に達しました。しばらくしてからお試しください。",
            ErrorCode::RateLimitExceeded => "リクエストが多すぎます。少し待ってからお試しください。",
            ErrorCode::VeoApiError => "現在動画を生成できません。しばらくしてからお試しください。",
            ErrorCode::AiApiError => "現在AIアシスタントを利用できません。しばらくしてからお試しください。",
            ErrorCode::SessionNotFound => "セッションが見つかりません。最初からやり直してください。",
            ErrorCode::SessionExpired => "セッションの有効期限が切れました。最初からやり直してください。",
            ErrorCode::SessionError => "セッションが別の操作で更新されました。もう一度お試しください。",
            ErrorCode::FileTooLarge => "画像が大きすぎます。より小さいファイルをアップロードしてください。",
            ErrorCode::UnsupportedFormat => "JPEG、PNG、WebP形式の画像をアップロードしてください。",
            ErrorCode::HandoffIncomplete => "前のステップがまだ完了していません。",
            ErrorCode::HandoffOutOfOrder => "このステップはすでに完了しています。",
            ErrorCode::Unauthorized => "この操作を行う権限がありません。",
            ErrorCode::NotFound => "リソースが見つかりませんでした。",
            ErrorCode::InternalServerError => "エラーが発生しました。しばらくしてからお試しください。",
        },
    }
}

pub fn status_message(status: JobStatus, locale: Locale) -> &'static str {
    match (locale, status) {
        (Locale::En, JobStatus::Pending) => "Your video is queued for generation.",
        (Locale::En, JobStatus::Processing) => "Your video is being generated.",
        (Locale::En, JobStatus::Completed) => "Your video is ready.",
        (Locale::En, JobStatus::Failed) => "Video generation failed.",
        (Locale::Ja, JobStatus::Pending) => "動画の生成を待っています。",
        (Locale::Ja, JobStatus::Processing) => "動画を生成しています。",
        (Locale::Ja, JobStatus::Completed) => "動画が完成しました。",
        (Locale::Ja, JobStatus::Failed) => "動画の生成に失敗しました。",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locale_scope() {
        assert_eq!(current_locale(), Locale::En);
        let inside = LOCALE.scope(Locale::Ja, async { current_locale() }).await;
        assert_eq!(inside, Locale::Ja);
    }

    #[test]
    fn test_messages_differ_by_locale() {
        assert_ne!(
            user_message(ErrorCode::JobExpired, Locale::En),
            user_message(ErrorCode::JobExpired, Locale::Ja)
        );
        assert_eq!(status_message(JobStatus::Completed, Locale::En), "Your video is ready.");
    }
}
